//! Aegis-Vector: Embedding and Vector Store Contracts
//!
//! The vector database and embedding model are external collaborators; the
//! platform consumes them through [`Embedder`] and [`VectorStore`]. The
//! in-memory implementations here are first-class: the pipeline's RAG
//! indexing path runs against them in tests and mock mode.
//!
//! Namespaces are tenant-scoped (`<tenant>/<collection>`); a query never
//! crosses namespaces.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;

/// Vector layer errors.
#[derive(Debug, Error)]
pub enum VectorError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector backend unavailable: {0}")]
    Upstream(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Text → vector contract.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embedding dimension this model produces.
    fn dimension(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError>;
}

/// A stored vector with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// A similarity hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

/// Vector database contract.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a record within a namespace.
    async fn upsert(&self, namespace: &str, record: VectorRecord) -> Result<(), VectorError>;

    /// Top-k cosine-similarity search within a namespace.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, VectorError>;

    /// Number of records in a namespace.
    async fn count(&self, namespace: &str) -> Result<usize, VectorError>;
}

/// Deterministic hash-projection embedder. Not semantically meaningful,
/// but stable: the same text always embeds to the same vector, which is what
/// idempotence and plumbing tests need.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let mut out = Vec::with_capacity(self.dimension);
        let mut counter = 0u32;
        while out.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(counter.to_be_bytes());
            hasher.update(text.as_bytes());
            for byte in hasher.finalize() {
                if out.len() == self.dimension {
                    break;
                }
                out.push(byte as f32 / 255.0 - 0.5);
            }
            counter += 1;
        }
        Ok(out)
    }
}

/// In-memory [`VectorStore`].
pub struct InMemoryVectorStore {
    namespaces: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, namespace: &str, record: VectorRecord) -> Result<(), VectorError> {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, VectorError> {
        let namespaces = self.namespaces.read();
        let Some(records) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<VectorMatch> = records
            .values()
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: cosine(vector, &r.vector),
                payload: r.payload.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn count(&self, namespace: &str) -> Result<usize, VectorError> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|r| r.len())
            .unwrap_or(0))
    }
}
