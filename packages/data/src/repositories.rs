//! Tenant-scoped repositories over the graph driver.
//!
//! Repositories return raw vertices; the service layer decides which typed
//! views to project. Every method takes the request context and filters on
//! its tenant.

use aegis_graph::GraphStore;
use aegis_ontology::Vertex;
use aegis_tenancy::RequestContext;
use std::sync::Arc;

use crate::DataError;

/// Patient reads.
pub struct PatientRepository {
    graph: Arc<dyn GraphStore>,
}

impl PatientRepository {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        patient_id: &str,
    ) -> Result<Option<Vertex>, DataError> {
        Ok(self.graph.get_vertex(&ctx.tenant_id, patient_id).await?)
    }

    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<Vertex>, DataError> {
        Ok(self.graph.vertices_by_label(&ctx.tenant_id, "Patient").await?)
    }
}

/// Shared shape for the per-edge child repositories.
macro_rules! edge_repository {
    ($name:ident, $edge:literal) => {
        pub struct $name {
            graph: Arc<dyn GraphStore>,
        }

        impl $name {
            pub fn new(graph: Arc<dyn GraphStore>) -> Self {
                Self { graph }
            }

            /// Children of a patient along the repository's edge.
            pub async fn list_for_patient(
                &self,
                ctx: &RequestContext,
                patient_id: &str,
            ) -> Result<Vec<Vertex>, DataError> {
                Ok(self
                    .graph
                    .neighbors(&ctx.tenant_id, patient_id, Some($edge))
                    .await?)
            }

            /// Children whose `status` property matches.
            pub async fn list_with_status(
                &self,
                ctx: &RequestContext,
                patient_id: &str,
                status: &str,
            ) -> Result<Vec<Vertex>, DataError> {
                Ok(self
                    .list_for_patient(ctx, patient_id)
                    .await?
                    .into_iter()
                    .filter(|v| {
                        v.prop_str("status") == Some(status)
                            || v.prop_str("clinical_status") == Some(status)
                    })
                    .collect())
            }
        }
    };
}

edge_repository!(ConditionRepository, "HAS_CONDITION");
edge_repository!(MedicationRepository, "HAS_MEDICATION");
edge_repository!(EncounterRepository, "HAS_ENCOUNTER");
edge_repository!(ObservationRepository, "HAS_OBSERVATION");

impl ObservationRepository {
    /// Latest observation for a code, by `effective_date` string ordering
    /// (ISO dates sort correctly lexically).
    pub async fn latest_by_code(
        &self,
        ctx: &RequestContext,
        patient_id: &str,
        code: &str,
    ) -> Result<Option<Vertex>, DataError> {
        let mut observations: Vec<Vertex> = self
            .list_for_patient(ctx, patient_id)
            .await?
            .into_iter()
            .filter(|v| v.prop_str("code") == Some(code))
            .collect();
        observations.sort_by(|a, b| {
            a.prop_str("effective_date")
                .unwrap_or("")
                .cmp(b.prop_str("effective_date").unwrap_or(""))
        });
        Ok(observations.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_graph::InMemoryGraph;
    use aegis_ontology::{Edge, EdgeKind};
    use aegis_tenancy::Purpose;

    async fn seeded() -> (Arc<InMemoryGraph>, RequestContext) {
        let graph = Arc::new(InMemoryGraph::new());
        let patient = Vertex::new("Patient", "X1", "tenant-a", "test");
        let condition = Vertex::new("Condition", "X1-I10", "tenant-a", "test")
            .with_prop("code", "I10")
            .with_prop("clinical_status", "active");
        graph.upsert_vertex(patient.clone()).await.unwrap();
        graph.upsert_vertex(condition.clone()).await.unwrap();
        graph
            .upsert_edge(Edge::between(EdgeKind::HasCondition, &patient, &condition))
            .await
            .unwrap();

        (graph, RequestContext::new("tenant-a", Purpose::Treatment))
    }

    #[tokio::test]
    async fn test_patient_get_scoped() {
        let (graph, ctx) = seeded().await;
        let repo = PatientRepository::new(graph);

        assert!(repo.get(&ctx, "Patient/X1").await.unwrap().is_some());

        let other = RequestContext::new("tenant-b", Purpose::Treatment);
        assert!(repo.get(&other, "Patient/X1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_condition_status_filter() {
        let (graph, ctx) = seeded().await;
        let repo = ConditionRepository::new(graph);

        let active = repo
            .list_with_status(&ctx, "Patient/X1", "active")
            .await
            .unwrap();
        assert_eq!(active.len(), 1);

        let resolved = repo
            .list_with_status(&ctx, "Patient/X1", "resolved")
            .await
            .unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn test_latest_observation() {
        let (graph, ctx) = seeded().await;
        let patient = graph.get_vertex("tenant-a", "Patient/X1").await.unwrap().unwrap();
        for (id, date, value) in [("o1", "2024-01-01", 7.1), ("o2", "2024-03-01", 6.4)] {
            let obs = Vertex::new("Observation", id, "tenant-a", "test")
                .with_prop("code", "4548-4")
                .with_prop("effective_date", date)
                .with_prop("value_numeric", value);
            graph.upsert_vertex(obs.clone()).await.unwrap();
            graph
                .upsert_edge(Edge::between(EdgeKind::HasObservation, &patient, &obs))
                .await
                .unwrap();
        }

        let repo = ObservationRepository::new(graph);
        let latest = repo
            .latest_by_code(&ctx, "Patient/X1", "4548-4")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.prop_f64("value_numeric"), Some(6.4));
    }
}
