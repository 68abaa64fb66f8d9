//! X12 278 prior-authorization connector.
//!
//! The HCR action code carries the decision:
//! `A1`/`A2` approved, `A3` denied, `A4` pending, `A6` cancelled.
//! UM describes the requested service, REF carries the authorization
//! number, DTP the effective window.

use aegis_ontology::{AuthorizationStatus, Edge, EdgeKind, Vertex};

use crate::sdk::{Connector, IngestScope, ParseOutcome, SourceType};
use crate::x12::parser::{format_x12_date, X12Document};

/// 278 connector.
pub struct X12PriorAuthConnector;

impl Connector for X12PriorAuthConnector {
    fn connector_type(&self) -> SourceType {
        SourceType::X12_278
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

        let auth_number = doc
            .segments
            .iter()
            .find(|s| s.id == "REF" && (s.get(0) == "BB" || s.get(0) == "NT"))
            .map(|s| s.get(1).to_string())
            .filter(|n| !n.is_empty());

        let patient_id = doc
            .segments
            .iter()
            .find(|s| s.id == "NM1" && (s.get(0) == "IL" || s.get(0) == "QC"))
            .map(|s| s.get(8).to_string())
            .filter(|id| !id.is_empty());

        let status = doc
            .segments
            .iter()
            .find(|s| s.id == "HCR")
            .map(|s| AuthorizationStatus::from_hcr_action(s.get(0)))
            .unwrap_or(AuthorizationStatus::Requested);

        let service_codes: Vec<serde_json::Value> = doc
            .segments
            .iter()
            .filter(|s| s.id == "SV1" || s.id == "SV2")
            .filter_map(|s| {
                doc.composite(s.get(0))
                    .get(1)
                    .filter(|code| !code.is_empty())
                    .map(|code| serde_json::Value::String(code.to_string()))
            })
            .collect();

        let effective = doc
            .segments
            .iter()
            .find(|s| s.id == "DTP" && (s.get(0) == "435" || s.get(0) == "472"))
            .and_then(|s| format_x12_date(s.get(2)));

        let Some(auth_number) = auth_number else {
            outcome.record_error("REF authorization number missing".to_string());
            return outcome;
        };

        let mut authorization = Vertex::new(
            "Authorization",
            &auth_number,
            &scope.tenant_id,
            &scope.source_system,
        )
        .with_prop("authorization_number", auth_number.as_str())
        .with_prop("status", serde_json::to_value(status).unwrap_or_default())
        .with_prop("service_codes", serde_json::Value::Array(service_codes))
        .with_opt_prop("effective_date", effective.as_deref());

        if let Some(patient_id) = patient_id {
            authorization = authorization.with_prop("patient_id", format!("Patient/{patient_id}"));
            outcome.push_edge(Edge::new(
                EdgeKind::HasAuthorization,
                "Patient",
                format!("Patient/{patient_id}"),
                "Authorization",
                authorization.id.clone(),
                scope.tenant_id.clone(),
            ));
        }
        outcome.push_vertex(authorization);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISA: &str = "ISA*00*          *00*          *ZZ*UMO            *ZZ*PROVIDER       *240310*1000*^*00501*000000004*0*P*:~";

    fn payload(action: &str) -> String {
        format!(
            "{ISA}ST*278*0001~\
NM1*IL*1*VEGA*MARISOL****MI*X1~\
UM*HS*I*2~\
HCR*{action}*AUTH-REF~\
REF*BB*AUTH-0099~\
DTP*435*D8*20240401~\
SV1*HC:27447*0*UN*1~\
SE*8*0001~\
IEA*1*000000004~"
        )
    }

    fn scope() -> IngestScope {
        IngestScope::new("tenant-a", "umo")
    }

    #[test]
    fn test_approved_authorization() {
        let outcome = X12PriorAuthConnector.parse(&payload("A1"), &scope());
        assert!(outcome.success, "errors: {:?}", outcome.errors);

        let auth = &outcome.vertices[0];
        assert_eq!(auth.id, "Authorization/AUTH-0099");
        assert_eq!(auth.prop_str("status"), Some("approved"));
        assert_eq!(auth.prop_str("effective_date"), Some("2024-04-01"));
        assert_eq!(
            auth.properties.get("service_codes").unwrap().as_array().unwrap()[0],
            "27447"
        );

        let edge = &outcome.edges[0];
        assert_eq!(edge.label, "HAS_AUTHORIZATION");
        assert_eq!(edge.from_id, "Patient/X1");
    }

    #[test]
    fn test_action_code_mapping() {
        for (action, expected) in [
            ("A1", "approved"),
            ("A2", "approved"),
            ("A3", "denied"),
            ("A4", "pending"),
            ("A6", "cancelled"),
        ] {
            let outcome = X12PriorAuthConnector.parse(&payload(action), &scope());
            assert_eq!(outcome.vertices[0].prop_str("status"), Some(expected), "{action}");
        }
    }

    #[test]
    fn test_missing_auth_number() {
        let payload = format!("{ISA}ST*278*0001~HCR*A1~SE*3*0001~IEA*1*000000004~");
        let outcome = X12PriorAuthConnector.parse(&payload, &scope());
        assert!(outcome.success);
        assert_eq!(outcome.errors.len(), 1);
    }
}
