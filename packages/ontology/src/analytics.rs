//! Agent-output entities with evidence traceability.
//!
//! Reasoning paths never embed back-pointers into clinical entities; they
//! carry stable vertex ids and the graph holds `HAS_EVIDENCE` edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

/// A model-calculated risk score for a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub patient_id: String,
    pub model_name: String,
    pub risk_type: String,
    pub score: f64,
    pub risk_level: RiskLevel,
    pub confidence: Option<f64>,
    pub prediction_window_days: Option<u32>,
    #[serde(default)]
    pub top_factors: Vec<String>,
    pub calculated_at: DateTime<Utc>,
}

/// A missing preventive or chronic-care action against a quality measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareGap {
    pub patient_id: String,
    pub measure_id: String,
    pub measure_name: String,
    pub category: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<String>,
    pub identified_at: DateTime<Utc>,
}

/// A recommendation produced by an agent workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRecommendation {
    pub patient_id: String,
    pub agent_id: String,
    pub recommendation_type: String,
    pub description: String,
    pub rationale: Option<String>,
    pub confidence: f64,
    pub generated_at: DateTime<Utc>,
    /// Vertex ids of the evidence entities the recommendation cites
    #[serde(default)]
    pub evidence_ids: Vec<String>,
}

/// The reasoning trail behind an agent conclusion. Each step cites the
/// vertex ids it drew on; persisting one fans out `HAS_EVIDENCE` edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningPath {
    pub execution_id: String,
    pub patient_id: Option<String>,
    pub conclusion: String,
    #[serde(default)]
    pub steps: Vec<ReasoningStep>,
    pub created_at: DateTime<Utc>,
}

/// One step in a reasoning path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub description: String,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
}

impl ReasoningPath {
    /// All distinct evidence vertex ids cited across steps.
    pub fn evidence_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .steps
            .iter()
            .flat_map(|s| s.evidence_ids.iter().map(String::as_str))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evidence_ids_deduped() {
        let path = ReasoningPath {
            execution_id: "exec-1".into(),
            patient_id: Some("Patient/1".into()),
            conclusion: "elevated readmission risk".into(),
            steps: vec![
                ReasoningStep {
                    description: "recent inpatient stay".into(),
                    evidence_ids: vec!["Encounter/V1".into(), "Condition/1-I50".into()],
                },
                ReasoningStep {
                    description: "heart failure on problem list".into(),
                    evidence_ids: vec!["Condition/1-I50".into()],
                },
            ],
            created_at: Utc::now(),
        };

        let ids = path.evidence_ids();
        assert_eq!(ids, vec!["Condition/1-I50", "Encounter/V1"]);
    }
}
