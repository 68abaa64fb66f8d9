//! Graph records emitted by connectors and persisted by the graph writer.
//!
//! A [`Vertex`] is keyed by `(label, id, tenant_id)` where `id` is always
//! `"Label/natural-id"`. Natural keys make re-ingestion idempotent: the same
//! payload upserts the same vertices.
//!
//! # Example
//!
//! ```rust,ignore
//! use aegis_ontology::records::{Vertex, Edge, EdgeKind};
//!
//! let patient = Vertex::new("Patient", "12345", "tenant-a", "epic")
//!     .with_prop("mrn", "12345")
//!     .with_prop("family_name", "Rivera");
//! let encounter = Vertex::new("Encounter", "V9", "tenant-a", "epic");
//! let edge = Edge::between(EdgeKind::HasEncounter, &patient, &encounter);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Ontology errors.
#[derive(Debug, Error)]
pub enum OntologyError {
    #[error("entity serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("vertex {id} is not a {expected} (label is {actual})")]
    LabelMismatch {
        id: String,
        expected: String,
        actual: String,
    },
}

/// Identity of a vertex within the graph.
///
/// Two vertices with the same key refer to the same entity; a write with an
/// existing key is an upsert, never a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexKey {
    pub label: String,
    pub id: String,
    pub tenant_id: String,
}

/// A tenant-tagged graph vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Entity label (e.g. `Patient`, `Claim`)
    pub label: String,
    /// Stable id of the form `Label/natural-id`
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// System the record came from (e.g. `epic`, `hl7v2`)
    pub source_system: String,
    /// Ingestion timestamp
    pub created_at: DateTime<Utc>,
    /// Entity attributes
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Vertex {
    /// Create a vertex from a natural key. The id becomes `label/natural_id`.
    pub fn new(
        label: impl Into<String>,
        natural_id: impl AsRef<str>,
        tenant_id: impl Into<String>,
        source_system: impl Into<String>,
    ) -> Self {
        let label = label.into();
        let id = format!("{}/{}", label, natural_id.as_ref());
        Self {
            label,
            id,
            tenant_id: tenant_id.into(),
            source_system: source_system.into(),
            created_at: Utc::now(),
            properties: Map::new(),
        }
    }

    /// Create a vertex for a record with no usable natural key.
    ///
    /// The id is derived from a SHA-256 of the payload, truncated to 16 hex
    /// chars, so re-ingesting the identical payload still upserts.
    pub fn content_addressed(
        label: impl Into<String>,
        payload: &str,
        tenant_id: impl Into<String>,
        source_system: impl Into<String>,
    ) -> Self {
        let digest = hex::encode(Sha256::digest(payload.as_bytes()));
        Self::new(label, &digest[..16], tenant_id, source_system)
    }

    /// Build a vertex from any serializable entity. Entity fields become
    /// vertex properties; null fields are dropped.
    pub fn from_entity<T: Serialize>(
        label: impl Into<String>,
        natural_id: impl AsRef<str>,
        tenant_id: impl Into<String>,
        source_system: impl Into<String>,
        entity: &T,
    ) -> Result<Self, OntologyError> {
        let mut vertex = Self::new(label, natural_id, tenant_id, source_system);
        if let Value::Object(map) = serde_json::to_value(entity)? {
            vertex.properties = map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .collect();
        }
        Ok(vertex)
    }

    /// Deserialize the vertex properties back into a typed entity.
    pub fn to_entity<T: serde::de::DeserializeOwned>(&self) -> Result<T, OntologyError> {
        Ok(serde_json::from_value(Value::Object(
            self.properties.clone(),
        ))?)
    }

    /// Set a property, builder style. Null values are dropped.
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.properties.insert(key.into(), value);
        }
        self
    }

    /// Set an optional property; `None` is a no-op.
    pub fn with_opt_prop(self, key: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.with_prop(key, v),
            None => self,
        }
    }

    /// Get a string property.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Get a numeric property.
    pub fn prop_f64(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(Value::as_f64)
    }

    /// Upsert identity.
    pub fn key(&self) -> VertexKey {
        VertexKey {
            label: self.label.clone(),
            id: self.id.clone(),
            tenant_id: self.tenant_id.clone(),
        }
    }

    /// The natural-id portion of the vertex id (after `Label/`).
    pub fn natural_id(&self) -> &str {
        self.id
            .split_once('/')
            .map(|(_, rest)| rest)
            .unwrap_or(&self.id)
    }
}

/// Directed, typed edge labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    HasEncounter,
    HasCondition,
    HasObservation,
    HasMedication,
    HasProcedure,
    HasClaim,
    HasLine,
    HasDenial,
    HasCoverage,
    HasConsent,
    HasProvision,
    HasAuthorization,
    HasCareGap,
    HasRiskScore,
    DocumentsCondition,
    DocumentsMedication,
    DocumentsAllergy,
    HasEvidence,
}

impl EdgeKind {
    /// Wire/graph label for the edge.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasEncounter => "HAS_ENCOUNTER",
            Self::HasCondition => "HAS_CONDITION",
            Self::HasObservation => "HAS_OBSERVATION",
            Self::HasMedication => "HAS_MEDICATION",
            Self::HasProcedure => "HAS_PROCEDURE",
            Self::HasClaim => "HAS_CLAIM",
            Self::HasLine => "HAS_LINE",
            Self::HasDenial => "HAS_DENIAL",
            Self::HasCoverage => "HAS_COVERAGE",
            Self::HasConsent => "HAS_CONSENT",
            Self::HasProvision => "HAS_PROVISION",
            Self::HasAuthorization => "HAS_AUTHORIZATION",
            Self::HasCareGap => "HAS_CARE_GAP",
            Self::HasRiskScore => "HAS_RISK_SCORE",
            Self::DocumentsCondition => "DOCUMENTS_CONDITION",
            Self::DocumentsMedication => "DOCUMENTS_MEDICATION",
            Self::DocumentsAllergy => "DOCUMENTS_ALLERGY",
            Self::HasEvidence => "HAS_EVIDENCE",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant-tagged directed edge between two vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub label: String,
    pub from_label: String,
    pub from_id: String,
    pub to_label: String,
    pub to_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Edge {
    /// Create an edge from explicit endpoints.
    pub fn new(
        kind: EdgeKind,
        from_label: impl Into<String>,
        from_id: impl Into<String>,
        to_label: impl Into<String>,
        to_id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            label: kind.as_str().to_string(),
            from_label: from_label.into(),
            from_id: from_id.into(),
            to_label: to_label.into(),
            to_id: to_id.into(),
            tenant_id: tenant_id.into(),
            properties: Map::new(),
        }
    }

    /// Create an edge between two already-built vertices.
    pub fn between(kind: EdgeKind, from: &Vertex, to: &Vertex) -> Self {
        Self::new(
            kind,
            from.label.clone(),
            from.id.clone(),
            to.label.clone(),
            to.id.clone(),
            from.tenant_id.clone(),
        )
    }

    /// Set an edge property, builder style.
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Identity used to deduplicate edges (create if absent).
    pub fn key(&self) -> (String, String, String, String) {
        (
            self.label.clone(),
            self.from_id.clone(),
            self.to_id.clone(),
            self.tenant_id.clone(),
        )
    }
}
