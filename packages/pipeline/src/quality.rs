//! Data-quality rule engine.
//!
//! Rule categories: completeness (required field present), conformance
//! (ISO date shape, code in enum), consistency (cross-field), accuracy
//! (numeric range). A record with any ERROR-severity failure is invalid
//! and diverts to the DLQ; WARNING failures ride along as notes.

use aegis_ontology::Vertex;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rule severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Rule category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    Completeness,
    Conformance,
    Consistency,
    Accuracy,
}

/// One rule evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub passed: bool,
    pub severity: Severity,
    pub category: RuleCategory,
    pub field: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub message: String,
}

type CheckFn = Box<dyn Fn(&Vertex) -> RuleOutcome + Send + Sync>;

/// A quality rule over a vertex.
pub struct QualityRule {
    pub id: String,
    pub category: RuleCategory,
    pub severity: Severity,
    check: CheckFn,
}

impl QualityRule {
    pub fn evaluate(&self, vertex: &Vertex) -> RuleOutcome {
        (self.check)(vertex)
    }
}

static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?)?$").unwrap()
});

/// Completeness: the field must be present and non-empty.
pub fn required_field(field: &str, severity: Severity) -> QualityRule {
    let field_name = field.to_string();
    let rule_id = format!("required_{field}");
    let id = rule_id.clone();
    QualityRule {
        id: rule_id,
        category: RuleCategory::Completeness,
        severity,
        check: Box::new(move |vertex| {
            let value = vertex.properties.get(&field_name);
            let passed = match value {
                Some(serde_json::Value::String(s)) => !s.is_empty(),
                Some(serde_json::Value::Null) | None => false,
                Some(_) => true,
            };
            RuleOutcome {
                rule_id: id.clone(),
                passed,
                severity,
                category: RuleCategory::Completeness,
                field: Some(field_name.clone()),
                expected: None,
                actual: value.map(|v| v.to_string()),
                message: if passed {
                    "OK".to_string()
                } else {
                    format!("required field '{field_name}' is missing")
                },
            }
        }),
    }
}

/// Conformance: when present, the field must look like an ISO date.
pub fn valid_date(field: &str, severity: Severity) -> QualityRule {
    let field_name = field.to_string();
    let rule_id = format!("valid_date_{field}");
    let id = rule_id.clone();
    QualityRule {
        id: rule_id,
        category: RuleCategory::Conformance,
        severity,
        check: Box::new(move |vertex| {
            let value = vertex.prop_str(&field_name);
            let passed = value.map(|v| ISO_DATE.is_match(v)).unwrap_or(true);
            RuleOutcome {
                rule_id: id.clone(),
                passed,
                severity,
                category: RuleCategory::Conformance,
                field: Some(field_name.clone()),
                expected: Some("ISO-8601 date".to_string()),
                actual: value.map(String::from),
                message: if passed {
                    "OK".to_string()
                } else {
                    format!("'{field_name}' is not an ISO date")
                },
            }
        }),
    }
}

/// Conformance: when present, the field must be one of the allowed codes.
pub fn valid_code(field: &str, allowed: &[&str], severity: Severity) -> QualityRule {
    let field_name = field.to_string();
    let allowed: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
    let rule_id = format!("valid_code_{field}");
    let id = rule_id.clone();
    QualityRule {
        id: rule_id,
        category: RuleCategory::Conformance,
        severity,
        check: Box::new(move |vertex| {
            let value = vertex.prop_str(&field_name);
            let passed = value.map(|v| allowed.iter().any(|a| a == v)).unwrap_or(true);
            RuleOutcome {
                rule_id: id.clone(),
                passed,
                severity,
                category: RuleCategory::Conformance,
                field: Some(field_name.clone()),
                expected: Some(allowed.join("|")),
                actual: value.map(String::from),
                message: if passed {
                    "OK".to_string()
                } else {
                    format!("'{field_name}' has an invalid code")
                },
            }
        }),
    }
}

/// Accuracy: when present and numeric, the field must sit in `[min, max]`.
pub fn valid_range(field: &str, min: Option<f64>, max: Option<f64>) -> QualityRule {
    let field_name = field.to_string();
    let rule_id = format!("valid_range_{field}");
    let id = rule_id.clone();
    QualityRule {
        id: rule_id,
        category: RuleCategory::Accuracy,
        severity: Severity::Warning,
        check: Box::new(move |vertex| {
            let value = vertex.prop_f64(&field_name);
            let passed = value
                .map(|v| min.map(|m| v >= m).unwrap_or(true) && max.map(|m| v <= m).unwrap_or(true))
                .unwrap_or(true);
            RuleOutcome {
                rule_id: id.clone(),
                passed,
                severity: Severity::Warning,
                category: RuleCategory::Accuracy,
                field: Some(field_name.clone()),
                expected: Some(format!("{min:?}..{max:?}")),
                actual: value.map(|v| v.to_string()),
                message: if passed {
                    "OK".to_string()
                } else {
                    format!("'{field_name}' is out of range")
                },
            }
        }),
    }
}

/// A record's validation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub vertex_id: String,
    pub outcomes: Vec<RuleOutcome>,
}

impl ValidationReport {
    /// Invalid when any ERROR-severity rule failed.
    pub fn is_valid(&self) -> bool {
        !self
            .outcomes
            .iter()
            .any(|o| !o.passed && o.severity == Severity::Error)
    }

    /// Failed-but-not-fatal notes that ride along with the record.
    pub fn warnings(&self) -> Vec<&RuleOutcome> {
        self.outcomes
            .iter()
            .filter(|o| !o.passed && o.severity == Severity::Warning)
            .collect()
    }

    /// Messages for the fatal failures.
    pub fn failures(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| !o.passed && o.severity == Severity::Error)
            .map(|o| o.message.clone())
            .collect()
    }
}

/// Per-label rule sets with healthcare defaults.
pub struct DataQualityValidator {
    by_label: HashMap<String, Vec<QualityRule>>,
}

impl DataQualityValidator {
    /// Empty validator; everything passes.
    pub fn new() -> Self {
        Self {
            by_label: HashMap::new(),
        }
    }

    /// Validator with the default healthcare rule sets.
    pub fn with_default_rules() -> Self {
        let mut validator = Self::new();

        validator.add_rules(
            "Patient",
            vec![
                valid_date("birth_date", Severity::Error),
                valid_code(
                    "gender",
                    &["male", "female", "other", "unknown"],
                    Severity::Warning,
                ),
            ],
        );
        validator.add_rules(
            "Encounter",
            vec![
                valid_date("start_date", Severity::Error),
                valid_code(
                    "status",
                    &["planned", "arrived", "in-progress", "finished", "cancelled", "unknown"],
                    Severity::Error,
                ),
            ],
        );
        validator.add_rules(
            "Observation",
            vec![
                required_field("code", Severity::Error),
                valid_date("effective_date", Severity::Warning),
            ],
        );
        validator.add_rules(
            "Claim",
            vec![
                valid_range("total_charge", Some(0.0), None),
                valid_date("service_date_start", Severity::Warning),
            ],
        );
        validator
    }

    pub fn add_rules(&mut self, label: &str, rules: Vec<QualityRule>) {
        self.by_label.entry(label.to_string()).or_default().extend(rules);
    }

    /// Run the label's rules over a vertex.
    pub fn validate(&self, vertex: &Vertex) -> ValidationReport {
        let outcomes = self
            .by_label
            .get(&vertex.label)
            .map(|rules| rules.iter().map(|rule| rule.evaluate(vertex)).collect())
            .unwrap_or_default();
        ValidationReport {
            vertex_id: vertex.id.clone(),
            outcomes,
        }
    }
}

impl Default for DataQualityValidator {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(birth_date: &str) -> Vertex {
        Vertex::new("Patient", "1", "t", "test")
            .with_prop("birth_date", birth_date)
            .with_prop("gender", "female")
    }

    #[test]
    fn test_valid_patient_passes() {
        let validator = DataQualityValidator::with_default_rules();
        let report = validator.validate(&patient("1970-01-01"));
        assert!(report.is_valid());
        assert!(report.warnings().is_empty());
    }

    #[test]
    fn test_bad_date_is_fatal() {
        let validator = DataQualityValidator::with_default_rules();
        let report = validator.validate(&patient("01/01/1970"));
        assert!(!report.is_valid());
        assert_eq!(report.failures().len(), 1);
    }

    #[test]
    fn test_warning_rides_along() {
        let validator = DataQualityValidator::with_default_rules();
        let vertex = Vertex::new("Patient", "1", "t", "test").with_prop("gender", "♀");
        let report = validator.validate(&vertex);
        assert!(report.is_valid());
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn test_missing_observation_code_is_fatal() {
        let validator = DataQualityValidator::with_default_rules();
        let vertex = Vertex::new("Observation", "o-1", "t", "test");
        assert!(!validator.validate(&vertex).is_valid());
    }

    #[test]
    fn test_negative_charge_warns() {
        let validator = DataQualityValidator::with_default_rules();
        let vertex = Vertex::new("Claim", "c-1", "t", "test").with_prop("total_charge", -5.0);
        let report = validator.validate(&vertex);
        // accuracy failures are warnings, not fatal
        assert!(report.is_valid());
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn test_unknown_label_passes() {
        let validator = DataQualityValidator::with_default_rules();
        let vertex = Vertex::new("ImagingStudy", "s-1", "t", "test");
        assert!(validator.validate(&vertex).is_valid());
    }

    #[test]
    fn test_iso_date_shapes() {
        assert!(ISO_DATE.is_match("2024-03-01"));
        assert!(ISO_DATE.is_match("2024-03-01T08:00:00Z"));
        assert!(ISO_DATE.is_match("2024-03-01T08:00:00+02:00"));
        assert!(!ISO_DATE.is_match("03/01/2024"));
    }
}
