//! Aegis-Data: Unified Data Service
//!
//! The only interface agents and the HTTP surface use for reads. Every
//! repository method takes the request context and scopes the underlying
//! graph query to `ctx.tenant_id` — a result can never contain another
//! tenant's entity.
//!
//! [`DataService::get_patient_360`] composes demographics, active
//! conditions and medications, recent encounters and latest vitals in one
//! logical read; [`DataService::get_patient_network`] delegates to the
//! graph driver's bounded traversal.

pub mod repositories;
pub mod service;

pub use repositories::{
    ConditionRepository, EncounterRepository, MedicationRepository, ObservationRepository,
    PatientRepository,
};
pub use service::{DataService, Patient360, PatientSummaryCounts};

use thiserror::Error;

/// Data service errors.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("patient not found: {0}")]
    PatientNotFound(String),

    #[error(transparent)]
    Graph(#[from] aegis_graph::GraphError),

    #[error("entity decode failed: {0}")]
    Decode(#[from] aegis_ontology::OntologyError),
}
