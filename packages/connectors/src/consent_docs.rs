//! Consent-document connector.
//!
//! Accepts a FHIR-Consent-shaped JSON payload and emits a Consent vertex
//! with its provisions, linked to the patient via `HAS_CONSENT`. The
//! governance consent engine reads these records at decision time.

use aegis_ontology::{Edge, EdgeKind, Vertex};
use serde_json::Value;

use crate::sdk::{Connector, IngestScope, ParseOutcome, SourceType};

/// Consent connector.
pub struct ConsentConnector;

impl Connector for ConsentConnector {
    fn connector_type(&self) -> SourceType {
        SourceType::Consent
    }

    fn validate(&self, payload: &str) -> Vec<String> {
        match serde_json::from_str::<Value>(payload) {
            Ok(root) => {
                let mut errors = Vec::new();
                if root.get("id").and_then(Value::as_str).unwrap_or("").is_empty() {
                    errors.push("consent id is required".to_string());
                }
                if patient_ref(&root).is_none() {
                    errors.push("patient reference is required".to_string());
                }
                errors
            }
            Err(e) => vec![format!("invalid JSON: {e}")],
        }
    }

    fn parse(&self, payload: &str, scope: &IngestScope) -> ParseOutcome {
        let root: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => return ParseOutcome::failure(format!("invalid JSON: {e}")),
        };

        let Some(id) = root.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()) else {
            return ParseOutcome::failure("consent id is required");
        };
        let Some(patient) = patient_ref(&root) else {
            return ParseOutcome::failure("patient reference is required");
        };

        let mut outcome = ParseOutcome::ok();

        let provisions = root
            .get("provisions")
            .or_else(|| root.get("provision"))
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        let provision_count = provisions.as_array().map(Vec::len).unwrap_or(0);

        let consent = Vertex::new("Consent", id, &scope.tenant_id, &scope.source_system)
            .with_opt_prop("status", root.get("status").and_then(Value::as_str))
            .with_opt_prop("scope", scope_code(&root))
            .with_opt_prop("date_time", root.get("dateTime").and_then(Value::as_str))
            .with_prop("patient_id", patient.clone())
            .with_prop("provisions", provisions);

        outcome.push_edge(Edge::new(
            EdgeKind::HasConsent,
            "Patient",
            patient,
            "Consent",
            consent.id.clone(),
            scope.tenant_id.clone(),
        ));
        outcome.push_vertex(consent);
        outcome.set_meta("provision_count", provision_count);
        outcome
    }
}

fn patient_ref(root: &Value) -> Option<String> {
    if let Some(reference) = root
        .get("patient")
        .and_then(|p| p.get("reference"))
        .and_then(Value::as_str)
    {
        return Some(reference.to_string());
    }
    root.get("patient_id")
        .and_then(Value::as_str)
        .map(|p| {
            if p.starts_with("Patient/") {
                p.to_string()
            } else {
                format!("Patient/{p}")
            }
        })
}

fn scope_code(root: &Value) -> Option<&str> {
    root.get("scope")
        .and_then(|s| {
            s.as_str().or_else(|| {
                s.get("coding")?
                    .as_array()?
                    .first()?
                    .get("code")?
                    .as_str()
            })
        })
}
