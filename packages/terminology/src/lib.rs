//! Aegis-Terminology: Code Systems and the Verified-Mapping Knowledge Base
//!
//! Two services back the normalization engine:
//! - [`TerminologyService`] — lookup and validation of standard codes
//!   (LOINC, SNOMED-CT, RxNorm, ICD-10) with canonical synonyms
//! - [`VerifiedMappingStore`] — the expert-in-the-loop knowledge base of
//!   `(source_system, local_code)` → standard-code mappings
//!
//! A verified mapping always wins over algorithmic matching; verifying one
//! is itself an audited event (the caller audits, the store returns what
//! was overwritten).

pub mod knowledge_base;
pub mod service;

pub use knowledge_base::{VerifiedMapping, VerifiedMappingStore};
pub use service::{CodeSystem, Concept, TerminologyService};
