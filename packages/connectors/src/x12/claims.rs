//! X12 837 professional/institutional claim connector.
//!
//! CLM opens a claim; NM1 qualifies patient (`QC`), subscriber (`IL`) and
//! billing provider (`85`); HI carries diagnosis composites; SV1 opens a
//! service line; DTP 472 dates whichever of the two is open.

use aegis_ontology::{Edge, EdgeKind, Vertex};

use crate::sdk::{Connector, IngestScope, ParseOutcome, SourceType};
use crate::x12::parser::{format_x12_date, parse_amount, parse_units, X12Document};

/// 837 connector.
pub struct X12ClaimConnector;

#[derive(Default)]
struct ClaimDraft {
    claim_id: String,
    total_charge: f64,
    facility_code: String,
    patient_id: Option<String>,
    subscriber_id: Option<String>,
    provider_id: Option<String>,
    diagnoses: Vec<String>,
    lines: Vec<LineDraft>,
    service_date: Option<String>,
}

struct LineDraft {
    procedure_code: String,
    modifiers: Vec<String>,
    charge: f64,
    units: u32,
    place_of_service: String,
    service_date: Option<String>,
}

impl Connector for X12ClaimConnector {
    fn connector_type(&self) -> SourceType {
        SourceType::X12_837
    }

    fn validate(&self, payload: &str) -> Vec<String> {
        X12Document::validate(payload)
    }

    fn parse(&self, payload: &str, scope: &IngestScope) -> ParseOutcome {
        let doc = match X12Document::parse(payload) {
            Ok(d) => d,
            Err(e) => return ParseOutcome::failure(e),
        };

        let mut outcome = ParseOutcome::ok();
        outcome.set_meta("transaction_type", doc.transaction_type.clone());
        outcome.set_meta("control_number", doc.control_number.clone());

        let mut drafts: Vec<ClaimDraft> = Vec::new();
        let mut in_service_line = false;
        // NM1 loops for subscriber/patient/provider precede CLM in an 837;
        // carry the most recent ids forward into the next claim
        let mut pending_patient: Option<String> = None;
        let mut pending_subscriber: Option<String> = None;
        let mut pending_provider: Option<String> = None;

        for segment in &doc.segments {
            match segment.id.as_str() {
                "CLM" => {
                    let composite = doc.composite(segment.get(4));
                    drafts.push(ClaimDraft {
                        claim_id: segment.get(0).to_string(),
                        total_charge: parse_amount(segment.get(1)),
                        facility_code: composite.first().copied().unwrap_or("").to_string(),
                        patient_id: pending_patient.clone(),
                        subscriber_id: pending_subscriber.clone(),
                        provider_id: pending_provider.clone(),
                        ..Default::default()
                    });
                    in_service_line = false;
                }
                "NM1" => {
                    let entity_id = segment.get(8).to_string();
                    if entity_id.is_empty() {
                        continue;
                    }
                    let target = drafts.last_mut();
                    match (segment.get(0), target) {
                        ("QC", Some(draft)) => draft.patient_id = Some(entity_id),
                        ("IL", Some(draft)) => draft.subscriber_id = Some(entity_id),
                        ("85", Some(draft)) => draft.provider_id = Some(entity_id),
                        ("QC", None) => pending_patient = Some(entity_id),
                        ("IL", None) => pending_subscriber = Some(entity_id),
                        ("85", None) => pending_provider = Some(entity_id),
                        _ => {}
                    }
                }
                "HI" => {
                    let Some(draft) = drafts.last_mut() else { continue };
                    for element in &segment.elements {
                        let parts = doc.composite(element);
                        if parts.len() >= 2 && !parts[1].is_empty() {
                            draft.diagnoses.push(parts[1].to_string());
                        }
                    }
                }
                "SV1" => {
                    let Some(draft) = drafts.last_mut() else { continue };
                    let composite = doc.composite(segment.get(0));
                    draft.lines.push(LineDraft {
                        procedure_code: composite.get(1).copied().unwrap_or("").to_string(),
                        modifiers: composite
                            .iter()
                            .skip(2)
                            .take(4)
                            .filter(|m| !m.is_empty())
                            .map(|m| m.to_string())
                            .collect(),
                        charge: parse_amount(segment.get(1)),
                        units: parse_units(segment.get(3), 1),
                        place_of_service: segment.get(4).to_string(),
                        service_date: None,
                    });
                    in_service_line = true;
                }
                "DTP" if segment.get(0) == "472" => {
                    let Some(draft) = drafts.last_mut() else { continue };
                    let date = format_x12_date(segment.get(2));
                    if in_service_line {
                        if let Some(line) = draft.lines.last_mut() {
                            line.service_date = date;
                        }
                    } else {
                        draft.service_date = date;
                    }
                }
                _ => {}
            }
        }

        if drafts.is_empty() {
            outcome.record_error("no CLM segments found".to_string());
            return outcome;
        }

        for draft in drafts {
            emit_claim(draft, scope, &mut outcome);
        }
        outcome
    }
}

fn emit_claim(draft: ClaimDraft, scope: &IngestScope, outcome: &mut ParseOutcome) {
    if draft.claim_id.is_empty() {
        outcome.record_error("CLM01 claim id missing".to_string());
        return;
    }

    let mut claim = Vertex::new("Claim", &draft.claim_id, &scope.tenant_id, &scope.source_system)
        .with_prop("claim_number", draft.claim_id.as_str())
        .with_prop("total_charge", draft.total_charge)
        .with_prop("status", "submitted")
        .with_opt_prop("facility_code", non_empty(&draft.facility_code))
        .with_opt_prop("provider_id", draft.provider_id.as_deref())
        .with_opt_prop("service_date_start", draft.service_date.as_deref());

    if let Some(primary) = draft.diagnoses.first() {
        claim = claim.with_prop("primary_diagnosis", primary.as_str());
    }
    if draft.diagnoses.len() > 1 {
        claim = claim.with_prop(
            "secondary_diagnoses",
            serde_json::Value::Array(
                draft.diagnoses[1..]
                    .iter()
                    .map(|d| serde_json::Value::String(d.clone()))
                    .collect(),
            ),
        );
    }

    // Patient edge: QC patient when present, else the subscriber is the patient
    if let Some(person_id) = draft.patient_id.as_deref().or(draft.subscriber_id.as_deref()) {
        outcome.push_edge(Edge::new(
            EdgeKind::HasClaim,
            "Patient",
            format!("Patient/{person_id}"),
            "Claim",
            claim.id.clone(),
            scope.tenant_id.clone(),
        ));
    }

    for (index, line) in draft.lines.iter().enumerate() {
        let line_number = (index + 1) as u32;
        let line_vertex = Vertex::new(
            "ClaimLine",
            format!("{}-{line_number}", draft.claim_id),
            &scope.tenant_id,
            &scope.source_system,
        )
        .with_prop("claim_id", claim.id.as_str())
        .with_prop("line_number", line_number)
        .with_prop("procedure_code", line.procedure_code.as_str())
        .with_prop("charge", line.charge)
        .with_prop("units", line.units)
        .with_opt_prop("place_of_service", non_empty(&line.place_of_service))
        .with_opt_prop("service_date", line.service_date.as_deref())
        .with_prop(
            "modifiers",
            serde_json::Value::Array(
                line.modifiers
                    .iter()
                    .map(|m| serde_json::Value::String(m.clone()))
                    .collect(),
            ),
        );

        outcome.push_edge(Edge::new(
            EdgeKind::HasLine,
            "Claim",
            claim.id.clone(),
            "ClaimLine",
            line_vertex.id.clone(),
            scope.tenant_id.clone(),
        ));
        outcome.push_vertex(line_vertex);
    }

    outcome.push_vertex(claim);
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> String {
        let isa = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *240301*1200*^*00501*000000001*0*P*:~";
        format!(
            "{isa}GS*HC*SENDER*RECEIVER*20240301*1200*1*X*005010X222A1~\
ST*837*0001~\
NM1*85*2*WESTSIDE CLINIC*****XX*1234567890~\
NM1*IL*1*VEGA*MARISOL****MI*SUB123~\
NM1*QC*1*VEGA*MARISOL****MI*X1~\
CLM*C1*100.00***11:B:1*Y*A*Y*Y~\
DTP*472*D8*20240215~\
HI*ABK:I50.9*ABF:E11.9~\
SV1*HC:99213:25*60.00*UN*1*11~\
DTP*472*D8*20240215~\
SV1*HC:93000*40.00*UN*1*11~\
DTP*472*D8*20240216~\
SE*12*0001~\
GE*1*1~\
IEA*1*000000001~"
        )
    }

    fn scope() -> IngestScope {
        IngestScope::new("tenant-a", "clearinghouse")
    }

    #[test]
    fn test_claim_with_two_lines() {
        let outcome = X12ClaimConnector.parse(&payload(), &scope());
        assert!(outcome.success, "errors: {:?}", outcome.errors);

        let claims: Vec<_> = outcome.vertices.iter().filter(|v| v.label == "Claim").collect();
        let lines: Vec<_> = outcome.vertices.iter().filter(|v| v.label == "ClaimLine").collect();
        assert_eq!(claims.len(), 1);
        assert_eq!(lines.len(), 2);

        let claim = claims[0];
        assert_eq!(claim.id, "Claim/C1");
        assert_eq!(claim.prop_f64("total_charge"), Some(100.0));
        assert_eq!(claim.prop_str("primary_diagnosis"), Some("I50.9"));
        assert_eq!(claim.prop_str("facility_code"), Some("11"));
    }

    #[test]
    fn test_line_details() {
        let outcome = X12ClaimConnector.parse(&payload(), &scope());
        let line1 = outcome.vertices.iter().find(|v| v.id == "ClaimLine/C1-1").unwrap();
        assert_eq!(line1.prop_str("procedure_code"), Some("99213"));
        assert_eq!(line1.prop_f64("charge"), Some(60.0));
        assert_eq!(line1.prop_str("service_date"), Some("2024-02-15"));
        assert_eq!(
            line1.properties.get("modifiers").unwrap().as_array().unwrap().len(),
            1
        );

        let line2 = outcome.vertices.iter().find(|v| v.id == "ClaimLine/C1-2").unwrap();
        assert_eq!(line2.prop_str("procedure_code"), Some("93000"));
        assert_eq!(line2.prop_str("service_date"), Some("2024-02-16"));
    }

    #[test]
    fn test_edges() {
        let outcome = X12ClaimConnector.parse(&payload(), &scope());
        let has_claim = outcome.edges.iter().find(|e| e.label == "HAS_CLAIM").unwrap();
        assert_eq!(has_claim.from_id, "Patient/X1");
        assert_eq!(has_claim.to_id, "Claim/C1");

        let has_lines: Vec<_> = outcome.edges.iter().filter(|e| e.label == "HAS_LINE").collect();
        assert_eq!(has_lines.len(), 2);
        assert!(has_lines.iter().all(|e| e.from_id == "Claim/C1"));
    }

    #[test]
    fn test_no_clm_is_record_error() {
        let isa = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *240301*1200*^*00501*000000001*0*P*:~";
        let outcome =
            X12ClaimConnector.parse(&format!("{isa}ST*837*0001~IEA*1*000000001~"), &scope());
        assert!(outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.vertices.is_empty());
    }

    #[test]
    fn test_malformed_root_fails() {
        let outcome = X12ClaimConnector.parse("not x12", &scope());
        assert!(!outcome.success);
    }
}
