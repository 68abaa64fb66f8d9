//! Wearable-device sample connector.
//!
//! Payload shape: `{patient_id, device, samples: [{metric, value, unit?,
//! timestamp}]}`. Each sample becomes an Observation keyed by
//! `(patient, device, metric, timestamp)` so repeated uploads of the same
//! export upsert instead of duplicating.

use aegis_ontology::{Edge, EdgeKind, Vertex};
use serde::Deserialize;

use crate::sdk::{Connector, IngestScope, ParseOutcome, SourceType};

/// Metrics the platform understands from consumer devices.
const KNOWN_METRICS: [&str; 6] = [
    "heart_rate",
    "steps",
    "spo2",
    "sleep_minutes",
    "respiratory_rate",
    "calories",
];

#[derive(Debug, Deserialize)]
struct WearablePayload {
    patient_id: String,
    device: String,
    #[serde(default)]
    samples: Vec<WearableSample>,
}

#[derive(Debug, Deserialize)]
struct WearableSample {
    metric: String,
    value: f64,
    #[serde(default)]
    unit: Option<String>,
    timestamp: String,
}

/// Wearables connector.
pub struct WearablesConnector;

impl Connector for WearablesConnector {
    fn connector_type(&self) -> SourceType {
        SourceType::Wearables
    }

    fn validate(&self, payload: &str) -> Vec<String> {
        match serde_json::from_str::<WearablePayload>(payload) {
            Ok(parsed) if parsed.patient_id.is_empty() => {
                vec!["patient_id is required".to_string()]
            }
            Ok(_) => Vec::new(),
            Err(e) => vec![format!("invalid wearable payload: {e}")],
        }
    }

    fn parse(&self, payload: &str, scope: &IngestScope) -> ParseOutcome {
        let parsed: WearablePayload = match serde_json::from_str(payload) {
            Ok(p) => p,
            Err(e) => return ParseOutcome::failure(format!("invalid wearable payload: {e}")),
        };
        if parsed.patient_id.is_empty() {
            return ParseOutcome::failure("patient_id is required");
        }

        let mut outcome = ParseOutcome::ok();
        let patient_vertex_id = format!("Patient/{}", parsed.patient_id);

        for (index, sample) in parsed.samples.iter().enumerate() {
            if sample.metric.is_empty() || sample.timestamp.is_empty() {
                outcome.record_error(format!("sample {index}: metric and timestamp required"));
                continue;
            }
            if !KNOWN_METRICS.contains(&sample.metric.as_str()) {
                outcome.warn(format!("sample {index}: unknown metric {}", sample.metric));
            }

            let observation = Vertex::new(
                "Observation",
                format!(
                    "{}-{}-{}-{}",
                    parsed.patient_id, parsed.device, sample.metric, sample.timestamp
                ),
                &scope.tenant_id,
                &scope.source_system,
            )
            .with_prop("code", sample.metric.as_str())
            .with_prop("value_numeric", sample.value)
            .with_opt_prop("unit", sample.unit.as_deref())
            .with_prop("effective_date", sample.timestamp.as_str())
            .with_prop("category", "wearable")
            .with_prop("device", parsed.device.as_str());

            outcome.push_edge(Edge::new(
                EdgeKind::HasObservation,
                "Patient",
                patient_vertex_id.clone(),
                "Observation",
                observation.id.clone(),
                scope.tenant_id.clone(),
            ));
            outcome.push_vertex(observation);
        }

        outcome.set_meta("device", parsed.device);
        outcome.set_meta("sample_count", parsed.samples.len());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> String {
        json!({
            "patient_id": "X1",
            "device": "watch-gen4",
            "samples": [
                {"metric": "heart_rate", "value": 72.0, "unit": "bpm", "timestamp": "2024-03-01T08:00:00Z"},
                {"metric": "spo2", "value": 97.0, "unit": "%", "timestamp": "2024-03-01T08:00:00Z"},
                {"metric": "mood", "value": 3.0, "timestamp": "2024-03-01T08:00:00Z"}
            ]
        })
        .to_string()
    }

    fn scope() -> IngestScope {
        IngestScope::new("tenant-a", "wearables")
    }

    #[test]
    fn test_samples_to_observations() {
        let outcome = WearablesConnector.parse(&payload(), &scope());
        assert!(outcome.success);
        assert_eq!(outcome.vertices.len(), 3);
        assert_eq!(outcome.edges.len(), 3);
        // unknown metric warns but still lands
        assert_eq!(outcome.warnings.len(), 1);

        let hr = outcome
            .vertices
            .iter()
            .find(|v| v.prop_str("code") == Some("heart_rate"))
            .unwrap();
        assert_eq!(hr.prop_f64("value_numeric"), Some(72.0));
        assert_eq!(hr.prop_str("device"), Some("watch-gen4"));
    }

    #[test]
    fn test_stable_ids_for_reupload() {
        let first = WearablesConnector.parse(&payload(), &scope());
        let second = WearablesConnector.parse(&payload(), &scope());
        let ids = |o: &ParseOutcome| {
            let mut v: Vec<String> = o.vertices.iter().map(|x| x.id.clone()).collect();
            v.sort();
            v
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_bad_sample_is_record_error() {
        let bad = json!({
            "patient_id": "X1",
            "device": "watch",
            "samples": [{"metric": "", "value": 1.0, "timestamp": ""}]
        })
        .to_string();

        let outcome = WearablesConnector.parse(&bad, &scope());
        assert!(outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.vertices.is_empty());
    }
}
