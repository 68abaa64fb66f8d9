//! The unified ingestion orchestrator.
//!
//! `ingest(source_type, payload, ctx, index_in_rag)`:
//! 1. resolve the connector (unknown type fails fast)
//! 2. parse; collect per-record errors
//! 3. run data quality per vertex — valid records continue, invalid ones
//!    divert to `<type>.dlq` with the failure reasons
//! 4. persist vertices before the edges that reference them (upsert)
//! 5. publish each validated record to `<type>.validated`
//! 6. optionally embed and upsert into the tenant's vector namespace
//!
//! Persist, publish and index run as three independent bounded stages; the
//! call fans out and waits for all three before returning counts. The
//! pipeline itself never returns `Err` — every failure shows up in the
//! result.

use aegis_connectors::{ConnectorRegistry, IngestScope, SourceType};
use aegis_governance::audit::{AuditCategory, AuditDraft, AuditService};
use aegis_graph::GraphStore;
use aegis_ontology::{Edge, Vertex};
use aegis_tenancy::RequestContext;
use aegis_vector::{Embedder, VectorRecord, VectorStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::publish::{topics, EventPublisher};
use crate::quality::DataQualityValidator;

/// Concurrent operations allowed per stage.
const STAGE_CONCURRENCY: usize = 8;

/// Result of one ingestion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResult {
    pub success: bool,
    pub source_type: String,
    pub records_processed: usize,
    pub records_written: usize,
    pub records_failed: usize,
    pub edges_written: usize,
    pub indexed: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub entity_counts: HashMap<String, usize>,
    pub timestamp: DateTime<Utc>,
}

impl IngestionResult {
    fn empty(source_type: &str) -> Self {
        Self {
            success: false,
            source_type: source_type.to_string(),
            records_processed: 0,
            records_written: 0,
            records_failed: 0,
            edges_written: 0,
            indexed: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            entity_counts: HashMap::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Vector-indexing collaborators.
pub struct RagIndex {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
}

/// The ingestion pipeline. Owns the only write path into the graph.
pub struct IngestionPipeline {
    registry: ConnectorRegistry,
    validator: Option<DataQualityValidator>,
    graph: Arc<dyn GraphStore>,
    publisher: Arc<dyn EventPublisher>,
    rag: Option<RagIndex>,
    audit: Arc<AuditService>,
    persist_slots: Arc<Semaphore>,
    publish_slots: Arc<Semaphore>,
    index_slots: Arc<Semaphore>,
}

impl IngestionPipeline {
    pub fn new(
        registry: ConnectorRegistry,
        validator: Option<DataQualityValidator>,
        graph: Arc<dyn GraphStore>,
        publisher: Arc<dyn EventPublisher>,
        rag: Option<RagIndex>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            registry,
            validator,
            graph,
            publisher,
            rag,
            audit,
            persist_slots: Arc::new(Semaphore::new(STAGE_CONCURRENCY)),
            publish_slots: Arc::new(Semaphore::new(STAGE_CONCURRENCY)),
            index_slots: Arc::new(Semaphore::new(STAGE_CONCURRENCY)),
        }
    }

    /// Source types this pipeline can ingest.
    pub fn sources(&self) -> Vec<SourceType> {
        self.registry.list_sources()
    }

    /// Run the standard path. Never returns `Err`.
    pub async fn ingest(
        &self,
        source_type: SourceType,
        payload: &str,
        ctx: &RequestContext,
        source_system: &str,
        index_in_rag: bool,
    ) -> IngestionResult {
        let mut result = IngestionResult::empty(source_type.as_str());

        let Some(connector) = self.registry.get(source_type) else {
            result
                .errors
                .push(format!("no connector available for source type: {source_type}"));
            return result;
        };

        let scope = IngestScope::new(&ctx.tenant_id, source_system);
        let outcome = connector.parse(payload, &scope);
        result.errors.extend(outcome.errors.iter().cloned());
        result.warnings.extend(outcome.warnings.iter().cloned());
        if !outcome.success {
            tracing::warn!(
                source_type = %source_type,
                tenant_id = %ctx.tenant_id,
                "Payload rejected by connector"
            );
            return result;
        }

        result.records_processed = outcome.vertices.len();

        // Data quality gate
        let (valid, invalid): (Vec<Vertex>, Vec<(Vertex, Vec<String>)>) = match &self.validator {
            Some(validator) => {
                let mut valid = Vec::new();
                let mut invalid = Vec::new();
                for vertex in outcome.vertices {
                    let report = validator.validate(&vertex);
                    if report.is_valid() {
                        for warning in report.warnings() {
                            result.warnings.push(format!("{}: {}", vertex.id, warning.message));
                        }
                        valid.push(vertex);
                    } else {
                        invalid.push((vertex, report.failures()));
                    }
                }
                (valid, invalid)
            }
            None => (outcome.vertices, Vec::new()),
        };

        result.records_failed = invalid.len();
        for (vertex, reasons) in &invalid {
            result
                .errors
                .push(format!("{} failed validation: {}", vertex.id, reasons.join("; ")));
        }

        // Drop edges whose endpoints were diverted
        let diverted: HashSet<&str> = invalid.iter().map(|(v, _)| v.id.as_str()).collect();
        let edges: Vec<Edge> = outcome
            .edges
            .into_iter()
            .filter(|e| !diverted.contains(e.from_id.as_str()) && !diverted.contains(e.to_id.as_str()))
            .collect();

        // Fan out: persist / publish / index, each a bounded stage
        let persist = self.persist_stage(&valid, &edges);
        let publish = self.publish_stage(source_type, &valid, &invalid, ctx);
        let index = self.index_stage(&valid, ctx, index_in_rag);
        let (persisted, published, indexed) = tokio::join!(persist, publish, index);

        match persisted {
            Ok((vertices_written, edges_written)) => {
                result.records_written = vertices_written;
                result.edges_written = edges_written;
            }
            Err(error) => result.errors.push(error),
        }
        if let Err(error) = published {
            result.errors.push(error);
        }
        match indexed {
            Ok(count) => result.indexed = count,
            Err(error) => result.errors.push(error),
        }

        for vertex in &valid {
            *result.entity_counts.entry(vertex.label.clone()).or_insert(0) += 1;
        }

        result.success = result.records_written > 0 || result.records_processed > 0;

        self.audit.log(
            AuditDraft::new(
                AuditCategory::Modify,
                "ingest",
                &ctx.principal.user_id,
                &ctx.tenant_id,
                "IngestionBatch",
                source_type.as_str(),
            )
            .purpose(ctx.purpose.as_str())
            .metadata(json!({
                "records_written": result.records_written,
                "records_failed": result.records_failed,
                "source_system": source_system,
            })),
        );

        tracing::info!(
            source_type = %source_type,
            tenant_id = %ctx.tenant_id,
            written = result.records_written,
            failed = result.records_failed,
            "Ingestion complete"
        );
        result
    }

    /// Vertices first, then the edges that reference them.
    async fn persist_stage(
        &self,
        vertices: &[Vertex],
        edges: &[Edge],
    ) -> Result<(usize, usize), String> {
        let _permit = self
            .persist_slots
            .acquire()
            .await
            .map_err(|e| format!("persist stage unavailable: {e}"))?;

        let mut vertices_written = 0;
        for vertex in vertices {
            self.graph
                .upsert_vertex(vertex.clone())
                .await
                .map_err(|e| format!("graph write failed: {e}"))?;
            vertices_written += 1;
        }
        let mut edges_written = 0;
        for edge in edges {
            self.graph
                .upsert_edge(edge.clone())
                .await
                .map_err(|e| format!("graph edge write failed: {e}"))?;
            edges_written += 1;
        }
        Ok((vertices_written, edges_written))
    }

    /// Validated records to `<type>.validated`; diverted ones to the DLQ.
    async fn publish_stage(
        &self,
        source_type: SourceType,
        valid: &[Vertex],
        invalid: &[(Vertex, Vec<String>)],
        ctx: &RequestContext,
    ) -> Result<(), String> {
        let _permit = self
            .publish_slots
            .acquire()
            .await
            .map_err(|e| format!("publish stage unavailable: {e}"))?;

        let validated_topic = topics::validated(source_type);
        for vertex in valid {
            self.publisher
                .publish(
                    &validated_topic,
                    &ctx.tenant_id,
                    serde_json::to_value(vertex).map_err(|e| e.to_string())?,
                )
                .await
                .map_err(|e| format!("publish failed: {e}"))?;
        }

        let dlq_topic = topics::dlq(source_type);
        for (vertex, reasons) in invalid {
            self.publisher
                .publish(
                    &dlq_topic,
                    &ctx.tenant_id,
                    json!({
                        "record": vertex,
                        "reasons": reasons,
                        "request_id": ctx.request_id,
                    }),
                )
                .await
                .map_err(|e| format!("DLQ publish failed: {e}"))?;
        }
        Ok(())
    }

    /// Embed and upsert into `<tenant>/records`.
    async fn index_stage(
        &self,
        vertices: &[Vertex],
        ctx: &RequestContext,
        index_in_rag: bool,
    ) -> Result<usize, String> {
        if !index_in_rag {
            return Ok(0);
        }
        let Some(rag) = &self.rag else {
            return Err("RAG indexing requested but no vector backend configured".to_string());
        };

        let _permit = self
            .index_slots
            .acquire()
            .await
            .map_err(|e| format!("index stage unavailable: {e}"))?;

        let namespace = format!("{}/records", ctx.tenant_id);
        let mut indexed = 0;
        for vertex in vertices {
            let text = vertex_text(vertex);
            let vector = rag
                .embedder
                .embed(&text)
                .await
                .map_err(|e| format!("embedding failed: {e}"))?;
            rag.store
                .upsert(
                    &namespace,
                    VectorRecord {
                        id: vertex.id.clone(),
                        vector,
                        payload: serde_json::to_value(vertex).map_err(|e| e.to_string())?,
                    },
                )
                .await
                .map_err(|e| format!("vector upsert failed: {e}"))?;
            indexed += 1;
        }
        Ok(indexed)
    }
}

/// Flattened text rendering of a vertex for embedding.
fn vertex_text(vertex: &Vertex) -> String {
    let mut parts = vec![vertex.label.clone(), vertex.id.clone()];
    for (key, value) in &vertex.properties {
        parts.push(format!("{key}={value}"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::InMemoryPublisher;
    use aegis_graph::InMemoryGraph;
    use aegis_tenancy::Purpose;
    use aegis_vector::{HashEmbedder, InMemoryVectorStore};
    use serde_json::json;

    struct Harness {
        pipeline: IngestionPipeline,
        graph: Arc<InMemoryGraph>,
        publisher: Arc<InMemoryPublisher>,
        vectors: Arc<InMemoryVectorStore>,
    }

    fn harness() -> Harness {
        let graph = Arc::new(InMemoryGraph::new());
        let publisher = Arc::new(InMemoryPublisher::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let pipeline = IngestionPipeline::new(
            ConnectorRegistry::with_default_connectors(),
            Some(DataQualityValidator::with_default_rules()),
            graph.clone(),
            publisher.clone(),
            Some(RagIndex {
                embedder: Arc::new(HashEmbedder::default()),
                store: vectors.clone(),
            }),
            Arc::new(AuditService::new()),
        );
        Harness {
            pipeline,
            graph,
            publisher,
            vectors,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("tenant-a", Purpose::Operations)
    }

    fn patient_bundle(birth_date: &str) -> String {
        json!({
            "resourceType": "Bundle",
            "entry": [{
                "resource": {
                    "resourceType": "Patient",
                    "id": "P1",
                    "name": [{"given": ["A"], "family": "B"}],
                    "birthDate": birth_date,
                    "gender": "male"
                }
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_happy_path_counts() {
        let h = harness();
        let result = h
            .pipeline
            .ingest(SourceType::FhirR4, &patient_bundle("1970-01-01"), &ctx(), "epic", false)
            .await;

        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.records_processed, 1);
        assert_eq!(result.records_written, 1);
        assert_eq!(result.records_failed, 0);
        assert_eq!(result.entity_counts["Patient"], 1);

        let (vertices, _) = h.graph.counts("tenant-a").await.unwrap();
        assert_eq!(vertices, 1);
        assert_eq!(h.publisher.count("fhir_r4.validated"), 1);
        assert_eq!(h.publisher.count("fhir_r4.dlq"), 0);
    }

    #[tokio::test]
    async fn test_invalid_record_diverts_to_dlq() {
        let h = harness();
        let result = h
            .pipeline
            .ingest(
                SourceType::FhirR4,
                &patient_bundle("not-a-date"),
                &ctx(),
                "epic",
                false,
            )
            .await;

        assert_eq!(result.records_failed, 1);
        assert_eq!(result.records_written, 0);
        assert_eq!(h.publisher.count("fhir_r4.dlq"), 1);
        assert_eq!(h.publisher.count("fhir_r4.validated"), 0);

        let (vertices, _) = h.graph.counts("tenant-a").await.unwrap();
        assert_eq!(vertices, 0);
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let h = harness();
        let payload = patient_bundle("1970-01-01");

        h.pipeline
            .ingest(SourceType::FhirR4, &payload, &ctx(), "epic", false)
            .await;
        let before = h.graph.counts("tenant-a").await.unwrap();

        h.pipeline
            .ingest(SourceType::FhirR4, &payload, &ctx(), "epic", false)
            .await;
        let after = h.graph.counts("tenant-a").await.unwrap();

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_hl7_adt_persists_edge() {
        let h = harness();
        let adt = "MSH|^~\\&|EPIC|WEST|AEGIS|CLOUD|20240301120000||ADT^A01|M1|P|2.5\r\
PID|1||X1||Vega^Marisol||19700101|F\r\
PV1|1|I|ICU||||||||||||||||V9";

        let result = h
            .pipeline
            .ingest(SourceType::Hl7v2, adt, &ctx(), "interface-engine", false)
            .await;
        assert!(result.success, "errors: {:?}", result.errors);
        assert!(result.edges_written >= 1);

        let encounter = h.graph.get_vertex("tenant-a", "Encounter/V9").await.unwrap();
        assert!(encounter.is_some());
        let neighbors = h
            .graph
            .neighbors("tenant-a", "Patient/X1", Some("HAS_ENCOUNTER"))
            .await
            .unwrap();
        assert_eq!(neighbors.len(), 1);
    }

    #[tokio::test]
    async fn test_rag_indexing() {
        let h = harness();
        let result = h
            .pipeline
            .ingest(SourceType::FhirR4, &patient_bundle("1970-01-01"), &ctx(), "epic", true)
            .await;

        assert_eq!(result.indexed, 1);
        assert_eq!(h.vectors.count("tenant-a/records").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_never_throws() {
        let h = harness();
        let result = h
            .pipeline
            .ingest(SourceType::FhirR4, "not json", &ctx(), "epic", false)
            .await;
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.records_written, 0);
    }
}
