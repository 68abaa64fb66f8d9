//! The graph driver contract.

use aegis_ontology::{Edge, Vertex};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum traversal depth any caller may request.
pub const MAX_TRAVERSAL_DEPTH: u32 = 5;

/// Graph driver errors.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("vertex not found: {0}")]
    VertexNotFound(String),

    #[error("traversal depth {requested} exceeds maximum {max}")]
    DepthExceeded { requested: u32, max: u32 },

    #[error("graph backend unavailable: {0}")]
    Upstream(String),
}

/// One hop in a traversal result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalStep {
    pub edge_label: String,
    pub vertex: Vertex,
    pub depth: u32,
}

/// A vertex with its traversed neighborhood.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neighborhood {
    pub root: Vertex,
    pub steps: Vec<TraversalStep>,
}

/// Graph database contract consumed by the ingestion writer and the unified
/// data service. All operations are tenant-scoped.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or update a vertex, keyed by `(label, id, tenant_id)`.
    /// Properties of an existing vertex are merged (last write wins per key).
    async fn upsert_vertex(&self, vertex: Vertex) -> Result<(), GraphError>;

    /// Create an edge if an identical one does not already exist.
    async fn upsert_edge(&self, edge: Edge) -> Result<(), GraphError>;

    /// Fetch one vertex by id within a tenant.
    async fn get_vertex(&self, tenant_id: &str, id: &str) -> Result<Option<Vertex>, GraphError>;

    /// All vertices with a given label within a tenant.
    async fn vertices_by_label(
        &self,
        tenant_id: &str,
        label: &str,
    ) -> Result<Vec<Vertex>, GraphError>;

    /// Outgoing neighbors of a vertex, optionally filtered by edge label.
    async fn neighbors(
        &self,
        tenant_id: &str,
        id: &str,
        edge_label: Option<&str>,
    ) -> Result<Vec<Vertex>, GraphError>;

    /// Breadth-first traversal from a vertex up to `depth` hops.
    /// `depth` is clamped by [`MAX_TRAVERSAL_DEPTH`]; asking for more is an
    /// error rather than a silent truncation.
    async fn traverse(
        &self,
        tenant_id: &str,
        id: &str,
        depth: u32,
    ) -> Result<Neighborhood, GraphError>;

    /// Vertex and edge counts for a tenant (idempotence checks, health).
    async fn counts(&self, tenant_id: &str) -> Result<(usize, usize), GraphError>;
}
