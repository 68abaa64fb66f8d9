//! Aegis-Ontology: Unified Healthcare Entity Model
//!
//! Typed healthcare entities and directed edges, tenant-tagged and
//! serializable to graph properties. Every connector output, repository
//! row and agent artifact in the platform is expressed in this model.
//!
//! Organization:
//! - [`records`] — untyped graph records (`Vertex`, `Edge`) that connectors
//!   emit and the graph writer persists
//! - [`clinical`] — Patient, Encounter, Condition, Observation, medications,
//!   procedures, clinical documents
//! - [`financial`] — Claim, ClaimLine, Denial, Coverage, Authorization
//! - [`consent`] — Consent records with permit/deny provisions
//! - [`analytics`] — agent output traceability (RiskScore, CareGap,
//!   AIRecommendation, ReasoningPath)

pub mod analytics;
pub mod clinical;
pub mod consent;
pub mod financial;
pub mod records;

pub use analytics::{AiRecommendation, CareGap, ReasoningPath, RiskLevel, RiskScore};
pub use clinical::{
    ClinicalDocument, Condition, Encounter, EncounterClass, EncounterStatus, Gender,
    MedicationRequest, Observation, ObservationValue, Patient, Procedure,
};
pub use consent::{
    Consent, ConsentProvision, ConsentStatus, DataCategory, ProvisionType,
};
pub use financial::{
    Authorization, AuthorizationStatus, Claim, ClaimLine, ClaimStatus, ClaimType, Coverage,
    Denial, DenialCategory,
};
pub use records::{Edge, EdgeKind, OntologyError, Vertex, VertexKey};
