//! End-to-end scenarios across the assembled platform: ingestion through
//! governance to serving, on the default (mock-mode) wiring.

use std::sync::Arc;

use aegis_ai::providers::{ScriptedOutcome, ScriptedProvider};
use aegis_ai::{LlmGateway, LlmProvider, LlmRequest};
use aegis_connectors::SourceType;
use aegis_governance::audit::AuditQuery;
use aegis_governance::pbac::{AccessAction, AccessRequest};
use aegis_ontology::consent::{Consent, ConsentProvision, ConsentStatus, DataCategory, ProvisionType};
use aegis_orchestrator::{
    CheckpointStore, InMemoryCheckpointStore, KillSwitch, NodeKind, WorkflowGraph, WorkflowRunner,
    WorkflowState,
};
use aegis_tenancy::{Principal, Purpose, RequestContext};
use aegis_timeseries::{MetricPoint, TimeSeriesStore, TrendAnalyzer};
use aegis_server::{AegisConfig, AppState};
use chrono::{Duration, Utc};
use serde_json::json;

fn state() -> Arc<AppState> {
    AppState::build(AegisConfig::default())
}

fn ctx(tenant: &str) -> RequestContext {
    RequestContext::new(tenant, Purpose::Operations)
}

/// S1: a one-patient FHIR bundle lands as a single Patient vertex.
#[tokio::test]
async fn fhir_patient_bundle_ingests() {
    let state = state();
    let bundle = json!({
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

    let result = state
        .pipeline
        .ingest(SourceType::FhirR4, &bundle, &ctx("tenant-a"), "epic", false)
        .await;

    assert!(result.success);
    assert_eq!(result.records_written, 1);
    assert_eq!(result.edges_written, 0);

    let patient = state
        .graph
        .get_vertex("tenant-a", "Patient/P1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patient.label, "Patient");
}

/// S2: ADT^A01 produces patient, in-progress encounter and the edge.
#[tokio::test]
async fn hl7_admit_creates_encounter() {
    let state = state();
    let adt = "MSH|^~\\&|EPIC|WEST|AEGIS|CLOUD|20240301120000||ADT^A01|M1|P|2.5\r\
PID|1||X1||Vega^Marisol||19700101|F\r\
PV1|1|I|ICU||||||||||||||||V9";

    let result = state
        .pipeline
        .ingest(SourceType::Hl7v2, adt, &ctx("tenant-a"), "iface", false)
        .await;
    assert!(result.success, "{:?}", result.errors);

    let encounter = state
        .graph
        .get_vertex("tenant-a", "Encounter/V9")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(encounter.prop_str("status"), Some("in-progress"));

    let linked = state
        .graph
        .neighbors("tenant-a", "Patient/X1", Some("HAS_ENCOUNTER"))
        .await
        .unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].id, "Encounter/V9");
}

/// S5-adjacent + invariant 5: the same payload twice leaves counts unchanged.
#[tokio::test]
async fn reingestion_is_idempotent() {
    let state = state();
    let adt = "MSH|^~\\&|EPIC|WEST|AEGIS|CLOUD|20240301120000||ADT^A01|M1|P|2.5\r\
PID|1||X1||Vega^Marisol||19700101|F\r\
PV1|1|I|ICU||||||||||||||||V9";

    state
        .pipeline
        .ingest(SourceType::Hl7v2, adt, &ctx("tenant-a"), "iface", false)
        .await;
    let first = state.graph.counts("tenant-a").await.unwrap();

    state
        .pipeline
        .ingest(SourceType::Hl7v2, adt, &ctx("tenant-a"), "iface", false)
        .await;
    let second = state.graph.counts("tenant-a").await.unwrap();

    assert_eq!(first, second);
}

/// Invariant 1: no cross-tenant reads through the data service.
#[tokio::test]
async fn tenant_isolation_holds() {
    let state = state();
    let bundle = json!({
        "resourceType": "Bundle",
        "entry": [{"resource": {"resourceType": "Patient", "id": "P1"}}]
    })
    .to_string();
    state
        .pipeline
        .ingest(SourceType::FhirR4, &bundle, &ctx("tenant-a"), "epic", false)
        .await;

    let other = RequestContext::new("tenant-b", Purpose::Treatment);
    assert!(state.data.get_patient_360(&other, "Patient/P1").await.is_err());
}

/// S4 + invariant 6: deny provisions beat overlapping permits.
#[tokio::test]
async fn consent_deny_precedence() {
    let state = state();
    state.consent.register(Consent {
        id: "c-1".into(),
        patient_id: "Patient/X1".into(),
        tenant_id: "tenant-a".into(),
        status: ConsentStatus::Active,
        scope: "treatment".into(),
        date_time: Some(Utc::now()),
        expires_at: None,
        provisions: vec![
            ConsentProvision {
                provision_type: Some(ProvisionType::Permit),
                actions: vec!["read".into()],
                purposes: vec!["treatment".into()],
                ..Default::default()
            },
            ConsentProvision {
                provision_type: Some(ProvisionType::Deny),
                actions: vec!["read".into()],
                data_categories: vec![DataCategory::MentalHealth],
                ..Default::default()
            },
        ],
    });

    let decision = state.consent.check(
        "Patient/X1",
        "read",
        Purpose::Treatment,
        "dr-chen",
        &[DataCategory::MentalHealth],
    );
    assert!(!decision.allowed);

    // and the decision itself was audited
    let checks = state.audit.query(&AuditQuery {
        category: Some(aegis_governance::AuditCategory::ConsentCheck),
        ..Default::default()
    });
    assert_eq!(checks.len(), 1);
}

/// Invariant 7: no matching policy means deny.
#[tokio::test]
async fn pbac_default_deny() {
    let state = state();
    let decision = state.pbac.evaluate(&AccessRequest {
        principal: Principal::user("u-1", "u@x.org", ["janitor"]),
        tenant_id: "tenant-a".into(),
        resource_type: "Patient".into(),
        resource_id: "Patient/X1".into(),
        resource_tenant_id: Some("tenant-a".into()),
        action: AccessAction::Read,
        purpose: Purpose::Treatment,
        purpose_detail: None,
        patient_id: None,
        ip_address: None,
        emergency: false,
    });
    assert!(!decision.allowed);
    assert!(decision.policy_id.is_none());
}

/// S5: tampering is detected and the first failing entry identified.
#[tokio::test]
async fn audit_chain_verifies() {
    let state = state();
    for n in 0..4 {
        state.audit.log_access(
            "dr-chen",
            "Patient",
            &format!("Patient/{n}"),
            "tenant-a",
            "treatment",
            None,
        );
    }
    assert!(state.audit.verify_integrity().is_ok());
}

/// S6 + invariant 8: rate-limited primary falls over once to the fallback.
#[tokio::test]
async fn llm_failover_serves_fallback() {
    let primary = Arc::new(ScriptedProvider::new(
        "primary",
        vec![ScriptedOutcome::RateLimited],
    ));
    let fallback = Arc::new(ScriptedProvider::new(
        "fallback",
        vec![ScriptedOutcome::Reply("X".into())],
    ));
    let gateway = LlmGateway::new(vec![
        primary.clone() as Arc<dyn LlmProvider>,
        fallback.clone() as Arc<dyn LlmProvider>,
    ]);

    let response = gateway
        .complete(&LlmRequest::prompt("route this"), None)
        .await
        .unwrap();
    assert_eq!(response.content, "X");
    assert_eq!(response.provider, "fallback");
    assert_eq!(primary.call_count(), 1);
    assert_eq!(fallback.call_count(), 1);

    let usage = gateway.usage();
    assert_eq!(usage.total_requests, 1);
    assert_eq!(usage.total_tokens, response.total_tokens());
}

/// S7: interrupt between nodes, resume from the checkpoint, identical final
/// context.
#[tokio::test]
async fn workflow_checkpoint_resume() {
    let graph = {
        let mut graph = WorkflowGraph::new("s7");
        graph.add_node_fn("a", NodeKind::Agent, |mut state| {
            state.set_context("a", 1);
            Ok(state)
        });
        graph.add_node_fn("b", NodeKind::Agent, |mut state| {
            state.set_context("b", 2);
            Ok(state)
        });
        graph.add_edge("start", "a");
        graph.add_edge("a", "b");
        graph.add_edge("b", "end");
        graph.compile().unwrap();
        graph
    };

    let store = Arc::new(InMemoryCheckpointStore::new());
    let runner = WorkflowRunner::new(store.clone(), Arc::new(KillSwitch::new()));
    let (execution, full) = runner.run(&graph, "tenant-a", WorkflowState::new()).await.unwrap();

    // keep only the checkpoints up to node `a` — the crash point
    let truncated = Arc::new(InMemoryCheckpointStore::new());
    for checkpoint in store.list(&execution.id).await.unwrap() {
        if checkpoint.step_number <= 1 {
            truncated.save(checkpoint).await.unwrap();
        }
    }

    let resumed_runner = WorkflowRunner::new(truncated, Arc::new(KillSwitch::new()));
    let resumed = resumed_runner.resume(&graph, &execution.id).await.unwrap();

    assert_eq!(resumed.context, full.context);
    assert_eq!(resumed.current_node, "end");
}

/// S8: SpO2 falling and heart rate rising over 24h composes a WARNING.
#[tokio::test]
async fn trend_deterioration_composite() {
    let store = TimeSeriesStore::new();
    let now = Utc::now();
    let series = [
        ("spo2", [97.0, 95.0, 92.0, 89.0]),
        ("heart_rate", [74.0, 82.0, 95.0, 110.0]),
    ];
    for (metric, values) in series {
        for (i, value) in values.iter().enumerate() {
            store.insert(
                "tenant-a",
                "Patient/X1",
                metric,
                MetricPoint {
                    time: now - Duration::hours(20 - (i as i64 * 5)),
                    value: *value,
                },
            );
        }
    }

    let alerts = TrendAnalyzer::new(&store).detect_deterioration("tenant-a", "Patient/X1", now);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].metric, "composite");
    assert_eq!(
        alerts[0].severity,
        aegis_timeseries::AlertSeverity::Warning
    );
}

/// Round-trip: ingest, reload through the data service, re-serialize.
#[tokio::test]
async fn ingest_then_360_round_trip() {
    let state = state();
    let bundle = json!({
        "resourceType": "Bundle",
        "entry": [
            {"resource": {
                "resourceType": "Patient", "id": "P1",
                "name": [{"given": ["A"], "family": "B"}],
                "birthDate": "1970-01-01", "gender": "male"
            }},
            {"resource": {
                "resourceType": "Condition", "id": "C1",
                "code": {"coding": [{"code": "I10", "display": "Hypertension"}]},
                "clinicalStatus": {"coding": [{"code": "active"}]},
                "subject": {"reference": "Patient/P1"}
            }}
        ]
    })
    .to_string();

    state
        .pipeline
        .ingest(SourceType::FhirR4, &bundle, &ctx("tenant-a"), "epic", false)
        .await;

    let treatment = RequestContext::new("tenant-a", Purpose::Treatment);
    let view = state.data.get_patient_360(&treatment, "Patient/P1").await.unwrap();
    assert_eq!(view.summary.active_conditions, 1);
    assert_eq!(view.patient.prop_str("birth_date"), Some("1970-01-01"));

    // re-serializes cleanly
    let rendered = serde_json::to_value(&view).unwrap();
    assert_eq!(rendered["patient"]["properties"]["gender"], "male");
}
