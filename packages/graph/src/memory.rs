//! In-memory graph, the default driver for tests and mock mode.
//!
//! Vertex storage is a map keyed by `(label, id, tenant_id)`; upserting an
//! existing key merges properties. Edges deduplicate on
//! `(label, from_id, to_id, tenant_id)`.

use aegis_ontology::{Edge, Vertex, VertexKey};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::store::{
    GraphError, GraphStore, Neighborhood, TraversalStep, MAX_TRAVERSAL_DEPTH,
};

/// In-memory [`GraphStore`] implementation.
pub struct InMemoryGraph {
    vertices: RwLock<HashMap<VertexKey, Vertex>>,
    edges: RwLock<Vec<Edge>>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self {
            vertices: RwLock::new(HashMap::new()),
            edges: RwLock::new(Vec::new()),
        }
    }

    fn find_vertex(&self, tenant_id: &str, id: &str) -> Option<Vertex> {
        self.vertices
            .read()
            .values()
            .find(|v| v.tenant_id == tenant_id && v.id == id)
            .cloned()
    }
}

impl Default for InMemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    async fn upsert_vertex(&self, vertex: Vertex) -> Result<(), GraphError> {
        let mut vertices = self.vertices.write();
        match vertices.get_mut(&vertex.key()) {
            Some(existing) => {
                // Merge: incoming properties win, created_at stays
                for (k, v) in vertex.properties {
                    existing.properties.insert(k, v);
                }
                existing.source_system = vertex.source_system;
            }
            None => {
                vertices.insert(vertex.key(), vertex);
            }
        }
        Ok(())
    }

    async fn upsert_edge(&self, edge: Edge) -> Result<(), GraphError> {
        let mut edges = self.edges.write();
        if !edges.iter().any(|e| e.key() == edge.key()) {
            edges.push(edge);
        }
        Ok(())
    }

    async fn get_vertex(&self, tenant_id: &str, id: &str) -> Result<Option<Vertex>, GraphError> {
        Ok(self.find_vertex(tenant_id, id))
    }

    async fn vertices_by_label(
        &self,
        tenant_id: &str,
        label: &str,
    ) -> Result<Vec<Vertex>, GraphError> {
        let mut out: Vec<Vertex> = self
            .vertices
            .read()
            .values()
            .filter(|v| v.tenant_id == tenant_id && v.label == label)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn neighbors(
        &self,
        tenant_id: &str,
        id: &str,
        edge_label: Option<&str>,
    ) -> Result<Vec<Vertex>, GraphError> {
        let to_ids: Vec<String> = self
            .edges
            .read()
            .iter()
            .filter(|e| {
                e.tenant_id == tenant_id
                    && e.from_id == id
                    && edge_label.map(|l| e.label == l).unwrap_or(true)
            })
            .map(|e| e.to_id.clone())
            .collect();

        Ok(to_ids
            .iter()
            .filter_map(|to| self.find_vertex(tenant_id, to))
            .collect())
    }

    async fn traverse(
        &self,
        tenant_id: &str,
        id: &str,
        depth: u32,
    ) -> Result<Neighborhood, GraphError> {
        if depth > MAX_TRAVERSAL_DEPTH {
            return Err(GraphError::DepthExceeded {
                requested: depth,
                max: MAX_TRAVERSAL_DEPTH,
            });
        }

        let root = self
            .find_vertex(tenant_id, id)
            .ok_or_else(|| GraphError::VertexNotFound(id.to_string()))?;

        let mut steps = Vec::new();
        let mut visited: HashSet<String> = HashSet::from([root.id.clone()]);
        let mut frontier: VecDeque<(String, u32)> = VecDeque::from([(root.id.clone(), 0)]);

        while let Some((current, at_depth)) = frontier.pop_front() {
            if at_depth >= depth {
                continue;
            }
            let outgoing: Vec<Edge> = self
                .edges
                .read()
                .iter()
                .filter(|e| e.tenant_id == tenant_id && e.from_id == current)
                .cloned()
                .collect();

            for edge in outgoing {
                if !visited.insert(edge.to_id.clone()) {
                    continue;
                }
                if let Some(vertex) = self.find_vertex(tenant_id, &edge.to_id) {
                    steps.push(TraversalStep {
                        edge_label: edge.label.clone(),
                        vertex,
                        depth: at_depth + 1,
                    });
                    frontier.push_back((edge.to_id.clone(), at_depth + 1));
                }
            }
        }

        Ok(Neighborhood { root, steps })
    }

    async fn counts(&self, tenant_id: &str) -> Result<(usize, usize), GraphError> {
        let vertices = self
            .vertices
            .read()
            .values()
            .filter(|v| v.tenant_id == tenant_id)
            .count();
        let edges = self
            .edges
            .read()
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .count();
        Ok((vertices, edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_ontology::EdgeKind;

    fn patient(id: &str, tenant: &str) -> Vertex {
        Vertex::new("Patient", id, tenant, "test")
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let graph = InMemoryGraph::new();
        graph
            .upsert_vertex(patient("1", "t").with_prop("mrn", "1"))
            .await
            .unwrap();
        graph
            .upsert_vertex(patient("1", "t").with_prop("city", "Oakland"))
            .await
            .unwrap();

        let (vertices, _) = graph.counts("t").await.unwrap();
        assert_eq!(vertices, 1);

        let merged = graph.get_vertex("t", "Patient/1").await.unwrap().unwrap();
        assert_eq!(merged.prop_str("mrn"), Some("1"));
        assert_eq!(merged.prop_str("city"), Some("Oakland"));
    }

    #[tokio::test]
    async fn test_edge_dedup() {
        let graph = InMemoryGraph::new();
        let p = patient("1", "t");
        let e = Vertex::new("Encounter", "V1", "t", "test");
        graph.upsert_vertex(p.clone()).await.unwrap();
        graph.upsert_vertex(e.clone()).await.unwrap();

        let edge = Edge::between(EdgeKind::HasEncounter, &p, &e);
        graph.upsert_edge(edge.clone()).await.unwrap();
        graph.upsert_edge(edge).await.unwrap();

        let (_, edges) = graph.counts("t").await.unwrap();
        assert_eq!(edges, 1);
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let graph = InMemoryGraph::new();
        graph.upsert_vertex(patient("1", "tenant-a")).await.unwrap();
        graph.upsert_vertex(patient("1", "tenant-b")).await.unwrap();

        assert!(graph.get_vertex("tenant-a", "Patient/1").await.unwrap().is_some());
        assert!(graph.get_vertex("tenant-c", "Patient/1").await.unwrap().is_none());

        let listed = graph.vertices_by_label("tenant-a", "Patient").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tenant_id, "tenant-a");
    }

    #[tokio::test]
    async fn test_traverse_depth_guard() {
        let graph = InMemoryGraph::new();
        graph.upsert_vertex(patient("1", "t")).await.unwrap();

        let err = graph.traverse("t", "Patient/1", 99).await.unwrap_err();
        assert!(matches!(err, GraphError::DepthExceeded { .. }));
    }

    #[tokio::test]
    async fn test_traverse_collects_hops() {
        let graph = InMemoryGraph::new();
        let p = patient("1", "t");
        let enc = Vertex::new("Encounter", "V1", "t", "test");
        let claim = Vertex::new("Claim", "C1", "t", "test");
        graph.upsert_vertex(p.clone()).await.unwrap();
        graph.upsert_vertex(enc.clone()).await.unwrap();
        graph.upsert_vertex(claim.clone()).await.unwrap();
        graph
            .upsert_edge(Edge::between(EdgeKind::HasEncounter, &p, &enc))
            .await
            .unwrap();
        graph
            .upsert_edge(Edge::between(EdgeKind::HasClaim, &p, &claim))
            .await
            .unwrap();

        let hood = graph.traverse("t", "Patient/1", 2).await.unwrap();
        assert_eq!(hood.root.id, "Patient/1");
        assert_eq!(hood.steps.len(), 2);

        let shallow = graph.traverse("t", "Patient/1", 0).await.unwrap();
        assert!(shallow.steps.is_empty());
    }
}
