//! Aegis-Pipeline: Unified Ingestion
//!
//! The one standard path from raw payload to the data moat:
//! connector parse → semantic normalization → data-quality validation →
//! graph persist → stream publish → optional vector indexing.
//!
//! - [`publish`] — pub/sub topics and the producer contract
//! - [`quality`] — the rule engine that gates what persists
//! - [`normalize`] — the KB → exact → LLM normalization cascade
//! - [`ingestion`] — the orchestrator tying it together
//!
//! The pipeline never aborts a payload for one bad record and never
//! panics; per-record problems are collected and invalid records divert to
//! the DLQ topic.

pub mod ingestion;
pub mod normalize;
pub mod publish;
pub mod quality;

pub use ingestion::{IngestionPipeline, IngestionResult};
pub use normalize::{CodeMapping, MappingMethod, NormalizationEngine};
pub use publish::{topics, EventPublisher, InMemoryPublisher, PublishError};
pub use quality::{
    DataQualityValidator, QualityRule, RuleCategory, RuleOutcome, Severity, ValidationReport,
};
