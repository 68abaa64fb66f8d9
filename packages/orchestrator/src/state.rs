//! Workflow state: opaque to the runtime, serialized as JSON, hashed for
//! checkpoint integrity.
//!
//! The canonical form is the JSON value rendering, which sorts object keys,
//! so the hash is stable across field-order differences. The stored hash is
//! SHA-256 truncated to 16 hex chars.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Length of the truncated state hash, in hex chars.
pub const STATE_HASH_LEN: usize = 16;

/// A message accumulated during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

/// State passed through the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default)]
    pub messages: Vec<StateMessage>,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub current_node: String,
    pub patient_id: Option<String>,
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            context: Map::new(),
            history: Vec::new(),
            errors: Vec::new(),
            current_node: "start".to_string(),
            patient_id: None,
            tenant_id: None,
            metadata: Map::new(),
        }
    }

    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        let mut state = Self::new();
        state.tenant_id = Some(tenant_id.into());
        state
    }

    pub fn add_message(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.messages.push(StateMessage {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now().to_rfc3339(),
        });
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.context.insert(key.into(), value.into());
    }

    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }

    pub fn context_bool(&self, key: &str) -> bool {
        self.context.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Canonical JSON rendering (object keys sorted).
    pub fn canonical(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        serde_json::to_string(&value)
    }

    /// `SHA-256(canonical(state))` truncated to 16 hex chars.
    pub fn hash(&self) -> Result<String, serde_json::Error> {
        let canonical = self.canonical()?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(hex::encode(digest)[..STATE_HASH_LEN].to_string())
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let mut state = WorkflowState::new();
        state.set_context("patient", "Patient/1");
        state.set_context("score", 0.82);

        let a = state.hash().unwrap();
        let b = state.clone().hash().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), STATE_HASH_LEN);
    }

    #[test]
    fn test_hash_changes_with_state() {
        let mut state = WorkflowState::new();
        let before = state.hash().unwrap();
        state.set_context("k", "v");
        assert_ne!(before, state.hash().unwrap());
    }

    #[test]
    fn test_round_trip_preserves_hash() {
        let mut state = WorkflowState::new();
        state.add_message("assistant", "analysis complete");
        state.history.push("analyze".into());

        let json = serde_json::to_string(&state).unwrap();
        let restored: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(state.hash().unwrap(), restored.hash().unwrap());
    }
}
