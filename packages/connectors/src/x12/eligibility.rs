//! X12 270 eligibility-inquiry connector.
//!
//! An inquiry is operational rather than clinical: it yields a Coverage
//! vertex carrying the subscriber/member identifiers, the payer, the TRN
//! trace number and the EQ service-type codes being asked about.

use aegis_ontology::{Edge, EdgeKind, Vertex};

use crate::sdk::{Connector, IngestScope, ParseOutcome, SourceType};
use crate::x12::parser::{format_x12_date, X12Document};

/// 270 connector.
pub struct X12EligibilityConnector;

impl Connector for X12EligibilityConnector {
    fn connector_type(&self) -> SourceType {
        SourceType::X12_270
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

        let member_id = doc
            .segments
            .iter()
            .find(|s| s.id == "NM1" && s.get(0) == "IL")
            .map(|s| s.get(8).to_string())
            .filter(|id| !id.is_empty());

        let Some(member_id) = member_id else {
            outcome.record_error("NM1*IL subscriber identifier missing".to_string());
            return outcome;
        };

        let payer_name = doc
            .segments
            .iter()
            .find(|s| s.id == "NM1" && s.get(0) == "PR")
            .map(|s| s.get(2).to_string());

        let trace = doc
            .segments
            .iter()
            .find(|s| s.id == "TRN")
            .map(|s| s.get(1).to_string());

        let service_types: Vec<serde_json::Value> = doc
            .segments
            .iter()
            .filter(|s| s.id == "EQ")
            .map(|s| serde_json::Value::String(s.get(0).to_string()))
            .collect();

        let inquiry_date = doc
            .segments
            .iter()
            .find(|s| s.id == "DTP" && s.get(0) == "291")
            .and_then(|s| format_x12_date(s.get(2)));

        let coverage = Vertex::new("Coverage", &member_id, &scope.tenant_id, &scope.source_system)
            .with_prop("member_id", member_id.as_str())
            .with_opt_prop("payer_name", payer_name.as_deref())
            .with_opt_prop("trace_number", trace.as_deref())
            .with_opt_prop("inquiry_date", inquiry_date.as_deref())
            .with_prop("service_types", serde_json::Value::Array(service_types))
            .with_prop("inquiry", true);

        outcome.push_edge(Edge::new(
            EdgeKind::HasCoverage,
            "Patient",
            format!("Patient/{member_id}"),
            "Coverage",
            coverage.id.clone(),
            scope.tenant_id.clone(),
        ));
        outcome.push_vertex(coverage);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISA: &str = "ISA*00*          *00*          *ZZ*PROVIDER       *ZZ*PAYER          *240301*0900*^*00501*000000003*0*P*:~";

    fn payload() -> String {
        format!(
            "{ISA}ST*270*0001~\
NM1*PR*2*ACME HEALTH*****PI*AH001~\
NM1*IL*1*VEGA*MARISOL****MI*MEM-44~\
TRN*1*TRACE-9*9ORIGID~\
DTP*291*D8*20240301~\
EQ*30~\
EQ*88~\
SE*8*0001~\
IEA*1*000000003~"
        )
    }

    #[test]
    fn test_inquiry_coverage() {
        let outcome =
            X12EligibilityConnector.parse(&payload(), &IngestScope::new("tenant-a", "edi"));
        assert!(outcome.success);

        let coverage = &outcome.vertices[0];
        assert_eq!(coverage.id, "Coverage/MEM-44");
        assert_eq!(coverage.prop_str("payer_name"), Some("ACME HEALTH"));
        assert_eq!(coverage.prop_str("trace_number"), Some("TRACE-9"));
        assert_eq!(coverage.prop_str("inquiry_date"), Some("2024-03-01"));
        assert_eq!(
            coverage.properties.get("service_types").unwrap().as_array().unwrap().len(),
            2
        );
        assert_eq!(outcome.edges[0].label, "HAS_COVERAGE");
    }

    #[test]
    fn test_missing_subscriber() {
        let payload = format!("{ISA}ST*270*0001~SE*2*0001~IEA*1*000000003~");
        let outcome =
            X12EligibilityConnector.parse(&payload, &IngestScope::new("tenant-a", "edi"));
        assert!(outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.vertices.is_empty());
    }
}
