//! PRO and SDOH questionnaire-response connector.
//!
//! Payload shape: `{instrument, patient_id, effective_date?, responses:
//! [{question, answer, score?}]}`. Item scores sum into an instrument total
//! with severity banding (PHQ-9 / GAD-7 style); each response also lands as
//! its own Observation so item-level trends stay queryable.

use aegis_ontology::{Edge, EdgeKind, Vertex};
use serde::Deserialize;

use crate::sdk::{Connector, IngestScope, ParseOutcome, SourceType};

/// PRO / SDOH connector. The two source types share a payload shape and
/// differ only in the category they stamp.
pub struct ProSdohConnector {
    source_type: SourceType,
    category: &'static str,
}

impl ProSdohConnector {
    /// Patient-reported-outcome flavor.
    pub fn pro() -> Self {
        Self {
            source_type: SourceType::Pro,
            category: "patient-reported-outcome",
        }
    }

    /// Social-determinants flavor.
    pub fn sdoh() -> Self {
        Self {
            source_type: SourceType::Sdoh,
            category: "sdoh",
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuestionnairePayload {
    instrument: String,
    patient_id: String,
    #[serde(default)]
    effective_date: Option<String>,
    #[serde(default)]
    responses: Vec<ItemResponse>,
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    question: String,
    #[serde(default)]
    answer: Option<serde_json::Value>,
    #[serde(default)]
    score: Option<f64>,
}

impl Connector for ProSdohConnector {
    fn connector_type(&self) -> SourceType {
        self.source_type
    }

    fn validate(&self, payload: &str) -> Vec<String> {
        match serde_json::from_str::<QuestionnairePayload>(payload) {
            Ok(parsed) => {
                let mut errors = Vec::new();
                if parsed.patient_id.is_empty() {
                    errors.push("patient_id is required".to_string());
                }
                if parsed.instrument.is_empty() {
                    errors.push("instrument is required".to_string());
                }
                errors
            }
            Err(e) => vec![format!("invalid questionnaire payload: {e}")],
        }
    }

    fn parse(&self, payload: &str, scope: &IngestScope) -> ParseOutcome {
        let parsed: QuestionnairePayload = match serde_json::from_str(payload) {
            Ok(p) => p,
            Err(e) => return ParseOutcome::failure(format!("invalid questionnaire payload: {e}")),
        };
        if parsed.patient_id.is_empty() {
            return ParseOutcome::failure("patient_id is required");
        }

        let mut outcome = ParseOutcome::ok();
        let patient_vertex_id = format!("Patient/{}", parsed.patient_id);
        let total_score: f64 = parsed.responses.iter().filter_map(|r| r.score).sum();

        // Instrument-total observation
        let total = Vertex::new(
            "Observation",
            format!("{}-{}-total", parsed.patient_id, parsed.instrument),
            &scope.tenant_id,
            &scope.source_system,
        )
        .with_prop("code", parsed.instrument.as_str())
        .with_prop("display", format!("{} total score", parsed.instrument))
        .with_prop("value_numeric", total_score)
        .with_prop("category", self.category)
        .with_opt_prop("effective_date", parsed.effective_date.as_deref())
        .with_opt_prop(
            "interpretation",
            severity_band(&parsed.instrument, total_score),
        );

        outcome.push_edge(Edge::new(
            EdgeKind::HasObservation,
            "Patient",
            patient_vertex_id.clone(),
            "Observation",
            total.id.clone(),
            scope.tenant_id.clone(),
        ));
        outcome.push_vertex(total);

        for (index, response) in parsed.responses.iter().enumerate() {
            if response.question.is_empty() {
                outcome.warn(format!("response {index}: missing question"));
                continue;
            }
            let mut item = Vertex::new(
                "Observation",
                format!("{}-{}-{index}", parsed.patient_id, parsed.instrument),
                &scope.tenant_id,
                &scope.source_system,
            )
            .with_prop("code", format!("{}-item-{}", parsed.instrument, index + 1))
            .with_prop("display", response.question.as_str())
            .with_prop("category", self.category)
            .with_opt_prop("effective_date", parsed.effective_date.as_deref());

            if let Some(score) = response.score {
                item = item.with_prop("value_numeric", score);
            } else if let Some(answer) = &response.answer {
                item = item.with_prop("value_string", answer.to_string().trim_matches('"'));
            }

            outcome.push_edge(Edge::new(
                EdgeKind::HasObservation,
                "Patient",
                patient_vertex_id.clone(),
                "Observation",
                item.id.clone(),
                scope.tenant_id.clone(),
            ));
            outcome.push_vertex(item);
        }

        outcome.set_meta("instrument", parsed.instrument);
        outcome.set_meta("total_score", total_score);
        outcome
    }
}

/// Severity banding for the common screening instruments.
fn severity_band(instrument: &str, total: f64) -> Option<&'static str> {
    match instrument.to_ascii_uppercase().as_str() {
        "PHQ-9" | "PHQ9" => Some(match total as u32 {
            0..=4 => "minimal",
            5..=9 => "mild",
            10..=14 => "moderate",
            15..=19 => "moderately-severe",
            _ => "severe",
        }),
        "GAD-7" | "GAD7" => Some(match total as u32 {
            0..=4 => "minimal",
            5..=9 => "mild",
            10..=14 => "moderate",
            _ => "severe",
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> String {
        json!({
            "instrument": "PHQ-9",
            "patient_id": "X1",
            "effective_date": "2024-03-01",
            "responses": [
                {"question": "Little interest or pleasure in doing things", "score": 2.0},
                {"question": "Feeling down, depressed, or hopeless", "score": 3.0},
                {"question": "Trouble sleeping", "score": 3.0},
                {"question": "Feeling tired", "score": 3.0}
            ]
        })
        .to_string()
    }

    fn scope() -> IngestScope {
        IngestScope::new("tenant-a", "intake-app")
    }

    #[test]
    fn test_total_score_and_banding() {
        let outcome = ProSdohConnector::pro().parse(&payload(), &scope());
        assert!(outcome.success);

        let total = outcome
            .vertices
            .iter()
            .find(|v| v.id.ends_with("-total"))
            .unwrap();
        assert_eq!(total.prop_f64("value_numeric"), Some(11.0));
        assert_eq!(total.prop_str("interpretation"), Some("moderate"));
        assert_eq!(total.prop_str("category"), Some("patient-reported-outcome"));
    }

    #[test]
    fn test_item_observations() {
        let outcome = ProSdohConnector::pro().parse(&payload(), &scope());
        let items: Vec<_> = outcome
            .vertices
            .iter()
            .filter(|v| !v.id.ends_with("-total"))
            .collect();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].prop_str("code"), Some("PHQ-9-item-1"));
        assert_eq!(
            outcome.edges.iter().filter(|e| e.label == "HAS_OBSERVATION").count(),
            5
        );
    }

    #[test]
    fn test_sdoh_category() {
        let food = json!({
            "instrument": "HUNGER-VS",
            "patient_id": "X1",
            "responses": [{"question": "Worried food would run out", "answer": "often"}]
        })
        .to_string();

        let outcome = ProSdohConnector::sdoh().parse(&food, &scope());
        assert!(outcome
            .vertices
            .iter()
            .all(|v| v.prop_str("category") == Some("sdoh")));
        let item = outcome.vertices.iter().find(|v| v.id.ends_with("-0")).unwrap();
        assert_eq!(item.prop_str("value_string"), Some("often"));
    }

    #[test]
    fn test_missing_patient_fails() {
        let bad = json!({"instrument": "PHQ-9", "patient_id": "", "responses": []}).to_string();
        assert!(!ProSdohConnector::pro().parse(&bad, &scope()).success);
    }
}
