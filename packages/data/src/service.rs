//! The unified data service facade.

use aegis_graph::{GraphStore, Neighborhood};
use aegis_ontology::Vertex;
use aegis_tenancy::RequestContext;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::repositories::{
    ConditionRepository, EncounterRepository, MedicationRepository, ObservationRepository,
    PatientRepository,
};
use crate::DataError;

/// Vital codes composed into the 360 view.
const VITAL_CODES: [(&str, &str); 5] = [
    ("8867-4", "heart_rate"),
    ("8480-6", "bp_systolic"),
    ("8462-4", "bp_diastolic"),
    ("2708-6", "spo2"),
    ("9279-1", "respiratory_rate"),
];

/// Roll-up counts on the 360 view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientSummaryCounts {
    pub active_conditions: usize,
    pub active_medications: usize,
    pub recent_encounters: usize,
}

/// The composed patient view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient360 {
    pub patient: Vertex,
    pub conditions: Vec<Vertex>,
    pub medications: Vec<Vertex>,
    pub encounters: Vec<Vertex>,
    pub recent_vitals: HashMap<String, serde_json::Value>,
    pub summary: PatientSummaryCounts,
}

/// Facade over the per-entity repositories. Read-only; writes go through
/// the ingestion pipeline's graph writer only.
pub struct DataService {
    graph: Arc<dyn GraphStore>,
    pub patients: PatientRepository,
    pub conditions: ConditionRepository,
    pub medications: MedicationRepository,
    pub encounters: EncounterRepository,
    pub observations: ObservationRepository,
}

impl DataService {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self {
            patients: PatientRepository::new(graph.clone()),
            conditions: ConditionRepository::new(graph.clone()),
            medications: MedicationRepository::new(graph.clone()),
            encounters: EncounterRepository::new(graph.clone()),
            observations: ObservationRepository::new(graph.clone()),
            graph,
        }
    }

    /// Compose the full patient view in one logical read.
    pub async fn get_patient_360(
        &self,
        ctx: &RequestContext,
        patient_id: &str,
    ) -> Result<Patient360, DataError> {
        let patient = self
            .patients
            .get(ctx, patient_id)
            .await?
            .ok_or_else(|| DataError::PatientNotFound(patient_id.to_string()))?;

        let conditions = self
            .conditions
            .list_with_status(ctx, patient_id, "active")
            .await?;
        let medications = self
            .medications
            .list_with_status(ctx, patient_id, "active")
            .await?;

        let mut encounters = self.encounters.list_for_patient(ctx, patient_id).await?;
        encounters.sort_by(|a, b| {
            b.prop_str("start_date")
                .unwrap_or("")
                .cmp(a.prop_str("start_date").unwrap_or(""))
        });
        encounters.truncate(10);

        let mut recent_vitals = HashMap::new();
        for (code, name) in VITAL_CODES {
            if let Some(observation) = self
                .observations
                .latest_by_code(ctx, patient_id, code)
                .await?
            {
                recent_vitals.insert(
                    name.to_string(),
                    serde_json::json!({
                        "value": observation.prop_f64("value_numeric"),
                        "unit": observation.prop_str("unit"),
                        "effective_date": observation.prop_str("effective_date"),
                    }),
                );
            }
        }

        let summary = PatientSummaryCounts {
            active_conditions: conditions.len(),
            active_medications: medications.len(),
            recent_encounters: encounters.len(),
        };

        tracing::debug!(
            patient_id = %patient_id,
            tenant_id = %ctx.tenant_id,
            conditions = summary.active_conditions,
            "Patient 360 composed"
        );

        Ok(Patient360 {
            patient,
            conditions,
            medications,
            encounters,
            recent_vitals,
            summary,
        })
    }

    /// Natural-language rendering of the 360 view for agent context.
    pub async fn get_patient_summary(
        &self,
        ctx: &RequestContext,
        patient_id: &str,
    ) -> Result<String, DataError> {
        let view = self.get_patient_360(ctx, patient_id).await?;

        let name = match (
            view.patient.prop_str("given_name"),
            view.patient.prop_str("family_name"),
        ) {
            (Some(given), Some(family)) => format!("{given} {family}"),
            _ => view.patient.id.clone(),
        };

        let mut lines = vec![
            format!("Patient: {name}"),
            format!(
                "Gender: {}",
                view.patient.prop_str("gender").unwrap_or("unknown")
            ),
            format!("Active conditions: {}", view.summary.active_conditions),
            format!("Active medications: {}", view.summary.active_medications),
        ];

        if !view.conditions.is_empty() {
            lines.push(String::new());
            lines.push("Conditions:".to_string());
            for condition in view.conditions.iter().take(5) {
                lines.push(format!(
                    "  - {}",
                    condition
                        .prop_str("display")
                        .or(condition.prop_str("code"))
                        .unwrap_or("unknown")
                ));
            }
        }
        if !view.medications.is_empty() {
            lines.push(String::new());
            lines.push("Medications:".to_string());
            for medication in view.medications.iter().take(5) {
                lines.push(format!(
                    "  - {}",
                    medication
                        .prop_str("display")
                        .or(medication.prop_str("code"))
                        .unwrap_or("unknown")
                ));
            }
        }

        Ok(lines.join("\n"))
    }

    /// Bounded traversal around a patient (depth guarded by the driver).
    pub async fn get_patient_network(
        &self,
        ctx: &RequestContext,
        patient_id: &str,
        depth: u32,
    ) -> Result<Neighborhood, DataError> {
        Ok(self.graph.traverse(&ctx.tenant_id, patient_id, depth).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_graph::{GraphError, InMemoryGraph};
    use aegis_ontology::{Edge, EdgeKind};
    use aegis_tenancy::Purpose;

    async fn seeded() -> (DataService, RequestContext) {
        let graph = Arc::new(InMemoryGraph::new());
        let patient = Vertex::new("Patient", "X1", "tenant-a", "test")
            .with_prop("given_name", "Marisol")
            .with_prop("family_name", "Vega")
            .with_prop("gender", "female");
        graph.upsert_vertex(patient.clone()).await.unwrap();

        let condition = Vertex::new("Condition", "X1-I10", "tenant-a", "test")
            .with_prop("code", "I10")
            .with_prop("display", "Essential hypertension")
            .with_prop("clinical_status", "active");
        graph.upsert_vertex(condition.clone()).await.unwrap();
        graph
            .upsert_edge(Edge::between(EdgeKind::HasCondition, &patient, &condition))
            .await
            .unwrap();

        let medication = Vertex::new("MedicationRequest", "X1-lis", "tenant-a", "test")
            .with_prop("display", "Lisinopril 10 MG")
            .with_prop("status", "active");
        graph.upsert_vertex(medication.clone()).await.unwrap();
        graph
            .upsert_edge(Edge::between(EdgeKind::HasMedication, &patient, &medication))
            .await
            .unwrap();

        let vitals = Vertex::new("Observation", "hr-1", "tenant-a", "test")
            .with_prop("code", "8867-4")
            .with_prop("value_numeric", 72.0)
            .with_prop("unit", "bpm")
            .with_prop("effective_date", "2024-03-01");
        graph.upsert_vertex(vitals.clone()).await.unwrap();
        graph
            .upsert_edge(Edge::between(EdgeKind::HasObservation, &patient, &vitals))
            .await
            .unwrap();

        (
            DataService::new(graph),
            RequestContext::new("tenant-a", Purpose::Treatment),
        )
    }

    #[tokio::test]
    async fn test_patient_360_composition() {
        let (service, ctx) = seeded().await;
        let view = service.get_patient_360(&ctx, "Patient/X1").await.unwrap();

        assert_eq!(view.summary.active_conditions, 1);
        assert_eq!(view.summary.active_medications, 1);
        assert_eq!(view.recent_vitals["heart_rate"]["value"], 72.0);
        assert_eq!(view.patient.prop_str("family_name"), Some("Vega"));
    }

    #[tokio::test]
    async fn test_360_not_found() {
        let (service, ctx) = seeded().await;
        assert!(matches!(
            service.get_patient_360(&ctx, "Patient/404").await,
            Err(DataError::PatientNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_tenant_isolation_in_360() {
        let (service, _) = seeded().await;
        let other = RequestContext::new("tenant-b", Purpose::Treatment);
        assert!(service.get_patient_360(&other, "Patient/X1").await.is_err());
    }

    #[tokio::test]
    async fn test_summary_rendering() {
        let (service, ctx) = seeded().await;
        let summary = service.get_patient_summary(&ctx, "Patient/X1").await.unwrap();
        assert!(summary.contains("Marisol Vega"));
        assert!(summary.contains("Essential hypertension"));
        assert!(summary.contains("Lisinopril"));
    }

    #[tokio::test]
    async fn test_network_depth_guard() {
        let (service, ctx) = seeded().await;
        let network = service.get_patient_network(&ctx, "Patient/X1", 2).await.unwrap();
        assert_eq!(network.steps.len(), 3);

        let error = service
            .get_patient_network(&ctx, "Patient/X1", 99)
            .await
            .unwrap_err();
        assert!(matches!(error, DataError::Graph(GraphError::DepthExceeded { .. })));
    }
}
