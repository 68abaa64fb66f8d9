//! X12 835 remittance connector.
//!
//! CLP opens a claim payment; CAS carries adjustment triples
//! `(reason, amount, quantity)` at stride 3 under a group code; SVC carries
//! service-line payments. A denied CLP (status 4) or a claim-level denial
//! adjustment produces a Denial vertex classified on the CARC taxonomy.

use aegis_ontology::{DenialCategory, Edge, EdgeKind, Vertex};

use crate::sdk::{Connector, IngestScope, ParseOutcome, SourceType};
use crate::x12::parser::{format_x12_date, parse_amount, parse_units, X12Document};

/// 835 connector.
pub struct X12RemittanceConnector;

struct Adjustment {
    group_code: String,
    reason_code: String,
    amount: f64,
}

struct RemitDraft {
    claim_id: String,
    status_code: String,
    total_charge: f64,
    paid_amount: f64,
    patient_responsibility: f64,
    payer_claim_number: String,
    adjustments: Vec<Adjustment>,
    service_payments: Vec<(String, f64, f64, u32)>,
    payment_date: Option<String>,
}

impl Connector for X12RemittanceConnector {
    fn connector_type(&self) -> SourceType {
        SourceType::X12_835
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

        let payment_date = doc
            .segments
            .iter()
            .find(|s| s.id == "DTM" && s.get(0) == "405")
            .and_then(|s| format_x12_date(s.get(1)));

        let mut drafts: Vec<RemitDraft> = Vec::new();
        for segment in &doc.segments {
            match segment.id.as_str() {
                "CLP" => drafts.push(RemitDraft {
                    claim_id: segment.get(0).to_string(),
                    status_code: segment.get(1).to_string(),
                    total_charge: parse_amount(segment.get(2)),
                    paid_amount: parse_amount(segment.get(3)),
                    patient_responsibility: parse_amount(segment.get(4)),
                    payer_claim_number: segment.get(6).to_string(),
                    adjustments: Vec::new(),
                    service_payments: Vec::new(),
                    payment_date: payment_date.clone(),
                }),
                "CAS" => {
                    let Some(draft) = drafts.last_mut() else { continue };
                    let group_code = segment.get(0).to_string();
                    let mut index = 1;
                    while index < segment.elements.len() {
                        let reason = segment.get(index);
                        let amount = parse_amount(segment.get(index + 1));
                        if !reason.is_empty() {
                            draft.adjustments.push(Adjustment {
                                group_code: group_code.clone(),
                                reason_code: reason.to_string(),
                                amount,
                            });
                        }
                        index += 3;
                    }
                }
                "SVC" => {
                    let Some(draft) = drafts.last_mut() else { continue };
                    let composite = doc.composite(segment.get(0));
                    draft.service_payments.push((
                        composite.get(1).copied().unwrap_or("").to_string(),
                        parse_amount(segment.get(1)),
                        parse_amount(segment.get(2)),
                        parse_units(segment.get(4), 1),
                    ));
                }
                _ => {}
            }
        }

        if drafts.is_empty() {
            outcome.record_error("no CLP segments found".to_string());
            return outcome;
        }

        for draft in drafts {
            emit_remittance(draft, scope, &mut outcome);
        }
        outcome
    }
}

fn claim_status(status_code: &str) -> &'static str {
    match status_code {
        "1" | "2" | "3" | "19" | "20" | "21" => "paid",
        "4" => "denied",
        "22" => "adjusted",
        _ => "pending",
    }
}

fn emit_remittance(draft: RemitDraft, scope: &IngestScope, outcome: &mut ParseOutcome) {
    if draft.claim_id.is_empty() {
        outcome.record_error("CLP01 claim id missing".to_string());
        return;
    }

    let status = claim_status(&draft.status_code);
    let claim = Vertex::new("Claim", &draft.claim_id, &scope.tenant_id, &scope.source_system)
        .with_prop("claim_number", draft.claim_id.as_str())
        .with_prop("status", status)
        .with_prop("total_charge", draft.total_charge)
        .with_prop("paid_amount", draft.paid_amount)
        .with_prop("patient_responsibility", draft.patient_responsibility)
        .with_opt_prop("payer_claim_number", non_empty(&draft.payer_claim_number))
        .with_opt_prop("payment_date", draft.payment_date.as_deref())
        .with_prop(
            "adjustments",
            serde_json::Value::Array(
                draft
                    .adjustments
                    .iter()
                    .map(|a| {
                        serde_json::json!({
                            "group_code": a.group_code,
                            "reason_code": a.reason_code,
                            "amount": a.amount,
                        })
                    })
                    .collect(),
            ),
        );

    // Denials: a denied claim, or any adjustment that zeroed-out dollars
    let denial_sources: Vec<&Adjustment> = if status == "denied" {
        draft.adjustments.iter().collect()
    } else {
        Vec::new()
    };
    for adjustment in denial_sources {
        let denial = Vertex::new(
            "Denial",
            format!("{}-{}", draft.claim_id, adjustment.reason_code),
            &scope.tenant_id,
            &scope.source_system,
        )
        .with_prop("claim_id", claim.id.as_str())
        .with_prop(
            "reason_code",
            format!("{}-{}", adjustment.group_code, adjustment.reason_code),
        )
        .with_prop("code_type", "CARC")
        .with_prop(
            "category",
            serde_json::to_value(DenialCategory::from_carc(&adjustment.reason_code))
                .unwrap_or_default(),
        )
        .with_prop("denied_amount", adjustment.amount)
        .with_opt_prop("denial_date", draft.payment_date.as_deref())
        .with_prop("status", "open");

        outcome.push_edge(Edge::new(
            EdgeKind::HasDenial,
            "Claim",
            claim.id.clone(),
            "Denial",
            denial.id.clone(),
            scope.tenant_id.clone(),
        ));
        outcome.push_vertex(denial);
    }

    for (index, (procedure, submitted, paid, units)) in draft.service_payments.iter().enumerate() {
        let line_number = (index + 1) as u32;
        let line = Vertex::new(
            "ClaimLine",
            format!("{}-{line_number}", draft.claim_id),
            &scope.tenant_id,
            &scope.source_system,
        )
        .with_prop("claim_id", claim.id.as_str())
        .with_prop("line_number", line_number)
        .with_prop("procedure_code", procedure.as_str())
        .with_prop("charge", *submitted)
        .with_prop("paid_amount", *paid)
        .with_prop("units", *units);

        outcome.push_edge(Edge::new(
            EdgeKind::HasLine,
            "Claim",
            claim.id.clone(),
            "ClaimLine",
            line.id.clone(),
            scope.tenant_id.clone(),
        ));
        outcome.push_vertex(line);
    }

    outcome.push_vertex(claim);
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISA: &str = "ISA*00*          *00*          *ZZ*PAYER          *ZZ*PROVIDER       *240315*1200*^*00501*000000002*0*P*:~";

    fn paid_payload() -> String {
        format!(
            "{ISA}ST*835*0001~\
DTM*405*20240315~\
CLP*C1*1*100.00*80.00*20.00*12*PCN-77~\
CAS*CO*45*20.00~\
SVC*HC:99213*60.00*48.00**1~\
SVC*HC:93000*40.00*32.00**1~\
SE*7*0001~\
IEA*1*000000002~"
        )
    }

    fn denied_payload() -> String {
        format!(
            "{ISA}ST*835*0001~\
DTM*405*20240315~\
CLP*C2*4*250.00*0.00*0.00*12*PCN-78~\
CAS*CO*197*250.00~\
SE*5*0001~\
IEA*1*000000002~"
        )
    }

    fn scope() -> IngestScope {
        IngestScope::new("tenant-a", "payer-remits")
    }

    #[test]
    fn test_paid_claim_with_adjustments() {
        let outcome = X12RemittanceConnector.parse(&paid_payload(), &scope());
        assert!(outcome.success, "errors: {:?}", outcome.errors);

        let claim = outcome.vertices.iter().find(|v| v.label == "Claim").unwrap();
        assert_eq!(claim.id, "Claim/C1");
        assert_eq!(claim.prop_str("status"), Some("paid"));
        assert_eq!(claim.prop_f64("paid_amount"), Some(80.0));
        assert_eq!(claim.prop_f64("patient_responsibility"), Some(20.0));
        assert_eq!(claim.prop_str("payment_date"), Some("2024-03-15"));

        let adjustments = claim.properties.get("adjustments").unwrap().as_array().unwrap();
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0]["reason_code"], "45");
        assert_eq!(adjustments[0]["amount"], 20.0);

        let lines: Vec<_> = outcome.vertices.iter().filter(|v| v.label == "ClaimLine").collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].prop_f64("paid_amount"), Some(48.0));
    }

    #[test]
    fn test_denied_claim_emits_denial() {
        let outcome = X12RemittanceConnector.parse(&denied_payload(), &scope());

        let claim = outcome.vertices.iter().find(|v| v.label == "Claim").unwrap();
        assert_eq!(claim.prop_str("status"), Some("denied"));

        let denial = outcome.vertices.iter().find(|v| v.label == "Denial").unwrap();
        assert_eq!(denial.id, "Denial/C2-197");
        assert_eq!(denial.prop_str("reason_code"), Some("CO-197"));
        assert_eq!(denial.prop_str("category"), Some("authorization"));
        assert_eq!(denial.prop_f64("denied_amount"), Some(250.0));

        let edge = outcome.edges.iter().find(|e| e.label == "HAS_DENIAL").unwrap();
        assert_eq!(edge.from_id, "Claim/C2");
        assert_eq!(edge.to_id, "Denial/C2-197");
    }

    #[test]
    fn test_cas_triple_stride() {
        let payload = format!(
            "{ISA}ST*835*0001~CLP*C3*4*90.00*0.00*0.00~CAS*CO*50*60.00**197*30.00~SE*4*0001~IEA*1*000000002~"
        );
        let outcome = X12RemittanceConnector.parse(&payload, &scope());
        let claim = outcome.vertices.iter().find(|v| v.label == "Claim").unwrap();
        let adjustments = claim.properties.get("adjustments").unwrap().as_array().unwrap();
        assert_eq!(adjustments.len(), 2);
        assert_eq!(adjustments[1]["reason_code"], "197");
    }
}
