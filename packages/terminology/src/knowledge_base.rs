//! The verified-mapping knowledge base.
//!
//! Human experts confirm code mappings; confirmed mappings short-circuit the
//! normalization cascade with confidence 1.0. The key `(source_system,
//! local_code)` is unique and newer verifications overwrite — the store
//! returns the displaced mapping so the caller can audit the change.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::service::CodeSystem;

/// An expert-verified mapping from a local code to a standard terminology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedMapping {
    pub source_system: String,
    pub local_code: String,
    pub local_description: Option<String>,
    pub standard_code: String,
    pub standard_system: CodeSystem,
    pub standard_description: String,
    pub verified_by: String,
    pub verified_at: DateTime<Utc>,
}

impl VerifiedMapping {
    /// Verified mappings are definitionally full-confidence.
    pub const CONFIDENCE: f64 = 1.0;

    fn key(&self) -> (String, String) {
        (self.source_system.clone(), self.local_code.clone())
    }
}

/// In-process verified-mapping store.
pub struct VerifiedMappingStore {
    mappings: RwLock<HashMap<(String, String), VerifiedMapping>>,
}

impl VerifiedMappingStore {
    pub fn new() -> Self {
        Self {
            mappings: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or overwrite a verification. Returns the mapping it displaced,
    /// if any, so the caller can record the supersession.
    pub fn verify(&self, mapping: VerifiedMapping) -> Option<VerifiedMapping> {
        let previous = self.mappings.write().insert(mapping.key(), mapping.clone());
        tracing::info!(
            source_system = %mapping.source_system,
            local_code = %mapping.local_code,
            standard_code = %mapping.standard_code,
            verified_by = %mapping.verified_by,
            superseded = previous.is_some(),
            "Mapping verified"
        );
        previous
    }

    /// Fetch the verified mapping for a local code, if one exists.
    pub fn get(&self, source_system: &str, local_code: &str) -> Option<VerifiedMapping> {
        self.mappings
            .read()
            .get(&(source_system.to_string(), local_code.to_string()))
            .cloned()
    }

    /// All verifications for a source system.
    pub fn list_for_source(&self, source_system: &str) -> Vec<VerifiedMapping> {
        let mut out: Vec<VerifiedMapping> = self
            .mappings
            .read()
            .values()
            .filter(|m| m.source_system == source_system)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.local_code.cmp(&b.local_code));
        out
    }

    pub fn len(&self) -> usize {
        self.mappings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.read().is_empty()
    }
}

impl Default for VerifiedMappingStore {
    fn default() -> Self {
        Self::new()
    }
}
