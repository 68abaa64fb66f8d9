//! Standard terminology lookup.
//!
//! The in-process service holds a seeded concept table; deployments load the
//! full code systems at startup. Lookup is by exact code, validation is by
//! (code, system), and synonym search supports the exact-match stage of the
//! normalization cascade.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Standard code systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeSystem {
    Loinc,
    SnomedCt,
    RxNorm,
    Icd10,
    Cpt,
}

impl CodeSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loinc => "LOINC",
            Self::SnomedCt => "SNOMED-CT",
            Self::RxNorm => "RxNorm",
            Self::Icd10 => "ICD-10",
            Self::Cpt => "CPT",
        }
    }

    /// Parse common spellings of a system name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().replace('_', "-").as_str() {
            "LOINC" => Some(Self::Loinc),
            "SNOMED" | "SNOMED-CT" | "SCT" => Some(Self::SnomedCt),
            "RXNORM" | "RX-NORM" => Some(Self::RxNorm),
            "ICD10" | "ICD-10" | "ICD-10-CM" => Some(Self::Icd10),
            "CPT" | "CPT-4" => Some(Self::Cpt),
            _ => None,
        }
    }
}

impl std::fmt::Display for CodeSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concept in a standard code system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub code: String,
    pub system: CodeSystem,
    pub display: String,
    /// Canonical synonyms, lowercase
    #[serde(default)]
    pub synonyms: Vec<String>,
}

/// In-process terminology service.
pub struct TerminologyService {
    concepts: RwLock<HashMap<(CodeSystem, String), Concept>>,
}

impl TerminologyService {
    /// Empty service; callers load concepts with [`Self::load`].
    pub fn new() -> Self {
        Self {
            concepts: RwLock::new(HashMap::new()),
        }
    }

    /// Service seeded with a starter set of common lab, problem, medication
    /// and diagnosis concepts.
    pub fn with_seed_catalog() -> Self {
        let service = Self::new();
        service.load(seed_concepts());
        service
    }

    /// Load (or replace) concepts.
    pub fn load(&self, concepts: impl IntoIterator<Item = Concept>) {
        let mut table = self.concepts.write();
        for concept in concepts {
            table.insert((concept.system, concept.code.clone()), concept);
        }
    }

    /// Number of loaded concepts.
    pub fn len(&self) -> usize {
        self.concepts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.read().is_empty()
    }

    /// Look up a code within a specific system.
    pub fn lookup(&self, system: CodeSystem, code: &str) -> Option<Concept> {
        self.concepts.read().get(&(system, code.to_string())).cloned()
    }

    /// Look up a code across all systems (first hit wins, LOINC first).
    pub fn lookup_any(&self, code: &str) -> Option<Concept> {
        const ORDER: [CodeSystem; 5] = [
            CodeSystem::Loinc,
            CodeSystem::SnomedCt,
            CodeSystem::RxNorm,
            CodeSystem::Icd10,
            CodeSystem::Cpt,
        ];
        ORDER.iter().find_map(|sys| self.lookup(*sys, code))
    }

    /// Whether (system, code) names a known concept.
    pub fn validate(&self, system: CodeSystem, code: &str) -> bool {
        self.concepts.read().contains_key(&(system, code.to_string()))
    }

    /// Exact display/synonym match within a system, case-insensitive.
    pub fn find_by_name(&self, system: CodeSystem, name: &str) -> Option<Concept> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.concepts
            .read()
            .values()
            .find(|c| {
                c.system == system
                    && (c.display.to_lowercase() == needle
                        || c.synonyms.iter().any(|s| *s == needle))
            })
            .cloned()
    }
}

impl Default for TerminologyService {
    fn default() -> Self {
        Self::with_seed_catalog()
    }
}

/// Starter concepts covering the vitals, common labs and problems the trend
/// engine and quality rules reference.
fn seed_concepts() -> Vec<Concept> {
    fn c(code: &str, system: CodeSystem, display: &str, synonyms: &[&str]) -> Concept {
        Concept {
            code: code.to_string(),
            system,
            display: display.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    vec![
        // LOINC labs and vitals
        c("4548-4", CodeSystem::Loinc, "Hemoglobin A1c/Hemoglobin.total in Blood", &["hba1c", "hemoglobin a1c", "hgba1c"]),
        c("718-7", CodeSystem::Loinc, "Hemoglobin [Mass/volume] in Blood", &["hemoglobin", "hgb"]),
        c("2160-0", CodeSystem::Loinc, "Creatinine [Mass/volume] in Serum or Plasma", &["creatinine", "serum creatinine"]),
        c("2823-3", CodeSystem::Loinc, "Potassium [Moles/volume] in Serum or Plasma", &["potassium", "k+"]),
        c("2345-7", CodeSystem::Loinc, "Glucose [Mass/volume] in Serum or Plasma", &["glucose", "blood glucose"]),
        c("8867-4", CodeSystem::Loinc, "Heart rate", &["heart rate", "pulse"]),
        c("8480-6", CodeSystem::Loinc, "Systolic blood pressure", &["systolic blood pressure", "sbp"]),
        c("8462-4", CodeSystem::Loinc, "Diastolic blood pressure", &["diastolic blood pressure", "dbp"]),
        c("2708-6", CodeSystem::Loinc, "Oxygen saturation in Arterial blood", &["spo2", "oxygen saturation", "o2 sat"]),
        c("9279-1", CodeSystem::Loinc, "Respiratory rate", &["respiratory rate", "rr"]),
        c("8310-5", CodeSystem::Loinc, "Body temperature", &["temperature", "body temperature"]),
        // C-CDA section codes
        c("11450-4", CodeSystem::Loinc, "Problem list - Reported", &["problem list"]),
        c("10160-0", CodeSystem::Loinc, "History of Medication use Narrative", &["medication list"]),
        c("48765-2", CodeSystem::Loinc, "Allergies and adverse reactions Document", &["allergy list"]),
        // SNOMED problems
        c("44054006", CodeSystem::SnomedCt, "Diabetes mellitus type 2", &["type 2 diabetes", "t2dm"]),
        c("38341003", CodeSystem::SnomedCt, "Hypertensive disorder", &["hypertension", "htn"]),
        c("84114007", CodeSystem::SnomedCt, "Heart failure", &["chf", "congestive heart failure"]),
        // ICD-10 diagnoses
        c("E11.9", CodeSystem::Icd10, "Type 2 diabetes mellitus without complications", &["type 2 diabetes"]),
        c("I10", CodeSystem::Icd10, "Essential (primary) hypertension", &["hypertension"]),
        c("I50.9", CodeSystem::Icd10, "Heart failure, unspecified", &["heart failure"]),
        c("J44.9", CodeSystem::Icd10, "Chronic obstructive pulmonary disease, unspecified", &["copd"]),
        // RxNorm medications
        c("860975", CodeSystem::RxNorm, "Metformin hydrochloride 500 MG Oral Tablet", &["metformin 500mg"]),
        c("197361", CodeSystem::RxNorm, "Lisinopril 10 MG Oral Tablet", &["lisinopril 10mg"]),
        c("617314", CodeSystem::RxNorm, "Atorvastatin 20 MG Oral Tablet", &["atorvastatin 20mg"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_validate() {
        let svc = TerminologyService::with_seed_catalog();
        let concept = svc.lookup(CodeSystem::Loinc, "4548-4").unwrap();
        assert!(concept.display.contains("Hemoglobin A1c"));

        assert!(svc.validate(CodeSystem::Loinc, "4548-4"));
        assert!(!svc.validate(CodeSystem::Loinc, "0000-0"));
        assert!(!svc.validate(CodeSystem::SnomedCt, "4548-4"));
    }

    #[test]
    fn test_lookup_any_prefers_loinc() {
        let svc = TerminologyService::with_seed_catalog();
        assert_eq!(svc.lookup_any("4548-4").unwrap().system, CodeSystem::Loinc);
        assert_eq!(svc.lookup_any("I10").unwrap().system, CodeSystem::Icd10);
        assert!(svc.lookup_any("nope").is_none());
    }

    #[test]
    fn test_find_by_synonym() {
        let svc = TerminologyService::with_seed_catalog();
        let hit = svc.find_by_name(CodeSystem::Loinc, "HbA1c").unwrap();
        assert_eq!(hit.code, "4548-4");
        assert!(svc.find_by_name(CodeSystem::Loinc, "").is_none());
    }

    #[test]
    fn test_system_parse() {
        assert_eq!(CodeSystem::parse("loinc"), Some(CodeSystem::Loinc));
        assert_eq!(CodeSystem::parse("SNOMED_CT"), Some(CodeSystem::SnomedCt));
        assert_eq!(CodeSystem::parse("icd10"), Some(CodeSystem::Icd10));
        assert_eq!(CodeSystem::parse("klingon"), None);
    }
}
