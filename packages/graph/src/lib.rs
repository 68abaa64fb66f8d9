//! Aegis-Graph: Graph Driver Contract
//!
//! The platform consumes a graph database through the [`GraphStore`]
//! contract: vertex upsert by `(label, id, tenant_id)`, edge create-if-
//! absent, and bounded traversal. Production deployments bind a real driver
//! (JanusGraph, Neptune); [`InMemoryGraph`] is a first-class implementation
//! used in tests and mock mode.
//!
//! Every read requires a tenant id and never returns vertices belonging to
//! another tenant.

pub mod memory;
pub mod store;

pub use memory::InMemoryGraph;
pub use store::{GraphError, GraphStore, Neighborhood, TraversalStep};
