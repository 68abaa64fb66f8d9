//! FHIR R4 bundle connector.
//!
//! Iterates bundle entries and dispatches on `resourceType`. References
//! (`subject.reference`, `encounter.reference`) become edges. Unknown
//! resource types are skipped with a warning, never an error.

use aegis_ontology::{Edge, EdgeKind, Gender, Vertex};
use serde_json::Value;

use crate::sdk::{Connector, IngestScope, ParseOutcome, SourceType};

/// FHIR R4 connector.
pub struct FhirConnector;

impl Connector for FhirConnector {
    fn connector_type(&self) -> SourceType {
        SourceType::FhirR4
    }

    fn validate(&self, payload: &str) -> Vec<String> {
        let mut errors = Vec::new();
        match serde_json::from_str::<Value>(payload) {
            Ok(root) => {
                match root.get("resourceType").and_then(Value::as_str) {
                    Some("Bundle") => {}
                    Some(other) => errors.push(format!("expected Bundle, got {other}")),
                    None => errors.push("missing resourceType".to_string()),
                }
            }
            Err(e) => errors.push(format!("invalid JSON: {e}")),
        }
        errors
    }

    fn parse(&self, payload: &str, scope: &IngestScope) -> ParseOutcome {
        let root: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => return ParseOutcome::failure(format!("invalid JSON: {e}")),
        };
        if root.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
            return ParseOutcome::failure("payload is not a FHIR Bundle");
        }

        let mut outcome = ParseOutcome::ok();
        let entries = root
            .get("entry")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        outcome.set_meta("entry_count", entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let Some(resource) = entry.get("resource") else {
                outcome.record_error(format!("entry {index}: missing resource"));
                continue;
            };
            let Some(resource_type) = resource.get("resourceType").and_then(Value::as_str) else {
                outcome.record_error(format!("entry {index}: missing resourceType"));
                continue;
            };
            let Some(fhir_id) = resource.get("id").and_then(Value::as_str) else {
                outcome.record_error(format!("entry {index}: {resource_type} without id"));
                continue;
            };

            match resource_type {
                "Patient" => transform_patient(resource, fhir_id, scope, &mut outcome),
                "Encounter" => transform_encounter(resource, fhir_id, scope, &mut outcome),
                "Condition" => transform_coded(
                    resource, fhir_id, "Condition", EdgeKind::HasCondition, scope, &mut outcome,
                ),
                "Observation" => transform_observation(resource, fhir_id, scope, &mut outcome),
                "MedicationRequest" => transform_medication(resource, fhir_id, scope, &mut outcome),
                "Procedure" => transform_coded(
                    resource, fhir_id, "Procedure", EdgeKind::HasProcedure, scope, &mut outcome,
                ),
                "AllergyIntolerance" => transform_coded(
                    resource,
                    fhir_id,
                    "AllergyIntolerance",
                    EdgeKind::DocumentsAllergy,
                    scope,
                    &mut outcome,
                ),
                "Coverage" => transform_coverage(resource, fhir_id, scope, &mut outcome),
                "Consent" => transform_consent(resource, fhir_id, scope, &mut outcome),
                "Claim" => transform_claim(resource, fhir_id, scope, &mut outcome),
                other => outcome.warn(format!("unknown resource type: {other}")),
            }
        }

        tracing::debug!(
            vertices = outcome.vertices.len(),
            edges = outcome.edges.len(),
            warnings = outcome.warnings.len(),
            "FHIR bundle parsed"
        );
        outcome
    }
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for segment in path {
        current = current.get(segment)?;
        if let Some(array) = current.as_array() {
            current = array.first()?;
        }
    }
    current.as_str()
}

/// First coding of a CodeableConcept field.
fn first_coding<'a>(resource: &'a Value, field: &str) -> Option<&'a Value> {
    resource
        .get(field)?
        .get("coding")
        .and_then(Value::as_array)?
        .first()
}

fn subject_edge(
    resource: &Value,
    vertex: &Vertex,
    kind: EdgeKind,
    scope: &IngestScope,
    outcome: &mut ParseOutcome,
) {
    if let Some(reference) = str_at(resource, &["subject", "reference"]) {
        outcome.push_edge(Edge::new(
            kind,
            "Patient",
            reference,
            vertex.label.clone(),
            vertex.id.clone(),
            scope.tenant_id.clone(),
        ));
    }
}

fn transform_patient(resource: &Value, id: &str, scope: &IngestScope, outcome: &mut ParseOutcome) {
    let mut vertex = Vertex::new("Patient", id, &scope.tenant_id, &scope.source_system)
        .with_opt_prop("family_name", str_at(resource, &["name", "family"]))
        .with_opt_prop("given_name", str_at(resource, &["name", "given"]))
        .with_opt_prop("birth_date", resource.get("birthDate").and_then(Value::as_str))
        .with_opt_prop(
            "phone",
            telecom_value(resource, "phone"),
        )
        .with_opt_prop("email", telecom_value(resource, "email"))
        .with_opt_prop("city", str_at(resource, &["address", "city"]))
        .with_opt_prop("state", str_at(resource, &["address", "state"]))
        .with_opt_prop("postal_code", str_at(resource, &["address", "postalCode"]));

    if let Some(gender) = resource.get("gender").and_then(Value::as_str) {
        let gender = Gender::from_fhir(gender);
        vertex = vertex.with_prop("gender", serde_json::to_value(gender).unwrap_or_default());
    }
    if let Some(true) = resource.get("deceasedBoolean").and_then(Value::as_bool) {
        vertex = vertex.with_prop("deceased", true);
    }
    if let Some(mrn) = extract_mrn(resource) {
        vertex = vertex.with_prop("mrn", mrn);
    }

    outcome.push_vertex(vertex);
}

/// MRN from `identifier[]` where the type coding is `MR`.
fn extract_mrn(resource: &Value) -> Option<String> {
    for ident in resource.get("identifier")?.as_array()? {
        let codings = ident.get("type")?.get("coding")?.as_array()?;
        if codings
            .iter()
            .any(|c| c.get("code").and_then(Value::as_str) == Some("MR"))
        {
            return ident.get("value")?.as_str().map(String::from);
        }
    }
    None
}

fn telecom_value(resource: &Value, system: &str) -> Option<String> {
    resource
        .get("telecom")?
        .as_array()?
        .iter()
        .find(|t| t.get("system").and_then(Value::as_str) == Some(system))?
        .get("value")?
        .as_str()
        .map(String::from)
}

fn transform_encounter(resource: &Value, id: &str, scope: &IngestScope, outcome: &mut ParseOutcome) {
    let vertex = Vertex::new("Encounter", id, &scope.tenant_id, &scope.source_system)
        .with_opt_prop("status", resource.get("status").and_then(Value::as_str))
        .with_opt_prop("encounter_class", str_at(resource, &["class", "code"]))
        .with_opt_prop("start_date", str_at(resource, &["period", "start"]))
        .with_opt_prop("end_date", str_at(resource, &["period", "end"]))
        .with_opt_prop("reason", str_at(resource, &["reasonCode", "text"]));

    subject_edge(resource, &vertex, EdgeKind::HasEncounter, scope, outcome);
    outcome.push_vertex(vertex);
}

/// Conditions, procedures and allergies share the coded shape.
fn transform_coded(
    resource: &Value,
    id: &str,
    label: &str,
    kind: EdgeKind,
    scope: &IngestScope,
    outcome: &mut ParseOutcome,
) {
    let coding = first_coding(resource, "code");
    let vertex = Vertex::new(label, id, &scope.tenant_id, &scope.source_system)
        .with_opt_prop("code", coding.and_then(|c| c.get("code")).and_then(Value::as_str))
        .with_opt_prop(
            "code_system",
            coding.and_then(|c| c.get("system")).and_then(Value::as_str),
        )
        .with_opt_prop(
            "display",
            coding.and_then(|c| c.get("display")).and_then(Value::as_str),
        )
        .with_opt_prop(
            "clinical_status",
            str_at(resource, &["clinicalStatus", "coding", "code"]),
        )
        .with_opt_prop(
            "onset_date",
            resource.get("onsetDateTime").and_then(Value::as_str),
        )
        .with_opt_prop(
            "performed_date",
            resource.get("performedDateTime").and_then(Value::as_str),
        );

    let vertex = vertex.with_opt_prop("encounter_id", str_at(resource, &["encounter", "reference"]));
    subject_edge(resource, &vertex, kind, scope, outcome);
    outcome.push_vertex(vertex);
}

fn transform_observation(resource: &Value, id: &str, scope: &IngestScope, outcome: &mut ParseOutcome) {
    let coding = first_coding(resource, "code");
    let mut vertex = Vertex::new("Observation", id, &scope.tenant_id, &scope.source_system)
        .with_opt_prop("code", coding.and_then(|c| c.get("code")).and_then(Value::as_str))
        .with_opt_prop(
            "code_system",
            coding.and_then(|c| c.get("system")).and_then(Value::as_str),
        )
        .with_opt_prop(
            "display",
            coding.and_then(|c| c.get("display")).and_then(Value::as_str),
        )
        .with_opt_prop("status", resource.get("status").and_then(Value::as_str))
        .with_opt_prop(
            "effective_date",
            resource.get("effectiveDateTime").and_then(Value::as_str),
        )
        .with_opt_prop(
            "category",
            str_at(resource, &["category", "coding", "code"]),
        );

    if let Some(quantity) = resource.get("valueQuantity") {
        vertex = vertex
            .with_opt_prop("value_numeric", quantity.get("value").and_then(Value::as_f64))
            .with_opt_prop("unit", quantity.get("unit").and_then(Value::as_str));
    } else if let Some(text) = resource.get("valueString").and_then(Value::as_str) {
        vertex = vertex.with_prop("value_string", text);
    } else if let Some(flag) = resource.get("valueBoolean").and_then(Value::as_bool) {
        vertex = vertex.with_prop("value_boolean", flag);
    }

    subject_edge(resource, &vertex, EdgeKind::HasObservation, scope, outcome);
    outcome.push_vertex(vertex);
}

fn transform_medication(resource: &Value, id: &str, scope: &IngestScope, outcome: &mut ParseOutcome) {
    let coding = first_coding(resource, "medicationCodeableConcept");
    let vertex = Vertex::new(
        "MedicationRequest",
        id,
        &scope.tenant_id,
        &scope.source_system,
    )
    .with_opt_prop("code", coding.and_then(|c| c.get("code")).and_then(Value::as_str))
    .with_opt_prop(
        "code_system",
        coding.and_then(|c| c.get("system")).and_then(Value::as_str),
    )
    .with_opt_prop(
        "display",
        coding.and_then(|c| c.get("display")).and_then(Value::as_str),
    )
    .with_opt_prop("status", resource.get("status").and_then(Value::as_str))
    .with_opt_prop(
        "dosage",
        str_at(resource, &["dosageInstruction", "text"]),
    )
    .with_opt_prop("start_date", resource.get("authoredOn").and_then(Value::as_str));

    subject_edge(resource, &vertex, EdgeKind::HasMedication, scope, outcome);
    outcome.push_vertex(vertex);
}

fn transform_coverage(resource: &Value, id: &str, scope: &IngestScope, outcome: &mut ParseOutcome) {
    let vertex = Vertex::new("Coverage", id, &scope.tenant_id, &scope.source_system)
        .with_opt_prop("member_id", str_at(resource, &["subscriberId"]))
        .with_opt_prop("status", resource.get("status").and_then(Value::as_str))
        .with_opt_prop("payer_id", str_at(resource, &["payor", "reference"]))
        .with_opt_prop("effective_date", str_at(resource, &["period", "start"]))
        .with_opt_prop("termination_date", str_at(resource, &["period", "end"]));

    if let Some(reference) = str_at(resource, &["beneficiary", "reference"]) {
        outcome.push_edge(Edge::new(
            EdgeKind::HasCoverage,
            "Patient",
            reference,
            "Coverage",
            vertex.id.clone(),
            scope.tenant_id.clone(),
        ));
    }
    outcome.push_vertex(vertex);
}

fn transform_consent(resource: &Value, id: &str, scope: &IngestScope, outcome: &mut ParseOutcome) {
    let vertex = Vertex::new("Consent", id, &scope.tenant_id, &scope.source_system)
        .with_opt_prop("status", resource.get("status").and_then(Value::as_str))
        .with_opt_prop("scope", str_at(resource, &["scope", "coding", "code"]))
        .with_opt_prop("date_time", resource.get("dateTime").and_then(Value::as_str))
        .with_opt_prop(
            "provisions",
            resource.get("provision").cloned(),
        );

    if let Some(reference) = str_at(resource, &["patient", "reference"]) {
        outcome.push_edge(Edge::new(
            EdgeKind::HasConsent,
            "Patient",
            reference,
            "Consent",
            vertex.id.clone(),
            scope.tenant_id.clone(),
        ));
    }
    outcome.push_vertex(vertex);
}

fn transform_claim(resource: &Value, id: &str, scope: &IngestScope, outcome: &mut ParseOutcome) {
    let vertex = Vertex::new("Claim", id, &scope.tenant_id, &scope.source_system)
        .with_opt_prop("status", resource.get("status").and_then(Value::as_str))
        .with_opt_prop("claim_type", str_at(resource, &["type", "coding", "code"]))
        .with_opt_prop(
            "billed_amount",
            str_at(resource, &["total", "value"])
                .and_then(|s| s.parse::<f64>().ok())
                .or_else(|| resource.get("total").and_then(|t| t.get("value")).and_then(Value::as_f64)),
        )
        .with_opt_prop("service_date_start", str_at(resource, &["billablePeriod", "start"]));

    if let Some(reference) = str_at(resource, &["patient", "reference"]) {
        outcome.push_edge(Edge::new(
            EdgeKind::HasClaim,
            "Patient",
            reference,
            "Claim",
            vertex.id.clone(),
            scope.tenant_id.clone(),
        ));
    }
    outcome.push_vertex(vertex);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> IngestScope {
        IngestScope::new("tenant-a", "epic")
    }

    #[test]
    fn test_single_patient_bundle() {
        let payload = json!({
            "resourceType": "Bundle",
            "entry": [{
                "resource": {
                    "resourceType": "Patient",
                    "id": "P1",
                    "name": [{"given": ["A"], "family": "B"}],
                    "birthDate": "1970-01-01",
                    "gender": "male"
                }
            }]
        })
        .to_string();

        let outcome = FhirConnector.parse(&payload, &scope());
        assert!(outcome.success);
        assert_eq!(outcome.vertices.len(), 1);
        assert!(outcome.edges.is_empty());

        let patient = &outcome.vertices[0];
        assert_eq!(patient.label, "Patient");
        assert_eq!(patient.id, "Patient/P1");
        assert_eq!(patient.prop_str("family_name"), Some("B"));
        assert_eq!(patient.prop_str("given_name"), Some("A"));
        assert_eq!(patient.prop_str("birth_date"), Some("1970-01-01"));
        assert_eq!(patient.prop_str("gender"), Some("male"));
        assert_eq!(patient.tenant_id, "tenant-a");
    }

    #[test]
    fn test_observation_with_subject_edge() {
        let payload = json!({
            "resourceType": "Bundle",
            "entry": [{
                "resource": {
                    "resourceType": "Observation",
                    "id": "O1",
                    "status": "final",
                    "code": {"coding": [{"system": "http://loinc.org", "code": "718-7", "display": "Hemoglobin"}]},
                    "subject": {"reference": "Patient/P1"},
                    "effectiveDateTime": "2024-02-01T08:00:00Z",
                    "valueQuantity": {"value": 13.2, "unit": "g/dL"}
                }
            }]
        })
        .to_string();

        let outcome = FhirConnector.parse(&payload, &scope());
        assert_eq!(outcome.vertices.len(), 1);
        assert_eq!(outcome.edges.len(), 1);
        assert_eq!(outcome.edges[0].label, "HAS_OBSERVATION");
        assert_eq!(outcome.edges[0].from_id, "Patient/P1");
        assert_eq!(outcome.vertices[0].prop_f64("value_numeric"), Some(13.2));
    }

    #[test]
    fn test_unknown_resource_warns() {
        let payload = json!({
            "resourceType": "Bundle",
            "entry": [{"resource": {"resourceType": "Basic", "id": "B1"}}]
        })
        .to_string();

        let outcome = FhirConnector.parse(&payload, &scope());
        assert!(outcome.success);
        assert!(outcome.vertices.is_empty());
        assert_eq!(outcome.warnings, vec!["unknown resource type: Basic"]);
    }

    #[test]
    fn test_malformed_root_fails() {
        let outcome = FhirConnector.parse("not json at all", &scope());
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);

        let not_bundle = FhirConnector.parse(r#"{"resourceType":"Patient","id":"X"}"#, &scope());
        assert!(!not_bundle.success);
    }

    #[test]
    fn test_entry_without_id_is_record_error() {
        let payload = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "Patient"}},
                {"resource": {"resourceType": "Patient", "id": "P2"}}
            ]
        })
        .to_string();

        let outcome = FhirConnector.parse(&payload, &scope());
        assert!(outcome.success);
        assert_eq!(outcome.vertices.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_mrn_extraction() {
        let payload = json!({
            "resourceType": "Bundle",
            "entry": [{
                "resource": {
                    "resourceType": "Patient",
                    "id": "P1",
                    "identifier": [
                        {"type": {"coding": [{"code": "SS"}]}, "value": "999"},
                        {"type": {"coding": [{"code": "MR"}]}, "value": "MRN-555"}
                    ]
                }
            }]
        })
        .to_string();

        let outcome = FhirConnector.parse(&payload, &scope());
        assert_eq!(outcome.vertices[0].prop_str("mrn"), Some("MRN-555"));
    }

    #[test]
    fn test_validate() {
        assert!(FhirConnector.validate(r#"{"resourceType":"Bundle"}"#).is_empty());
        assert!(!FhirConnector.validate("{}").is_empty());
        assert!(!FhirConnector.validate("garbage").is_empty());
    }
}
