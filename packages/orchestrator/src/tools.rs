//! Explicit tool registry.
//!
//! A tool is a plain record: name, description, JSON-Schema parameters and
//! a handler. Registration is a direct call at startup, not a side effect
//! of definition, so the set of tools an agent can reach is auditable.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Tool invocation errors.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("tool failed: {0}")]
    Failed(String),
}

/// Tool work function.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// A registered tool.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-Schema for the arguments object
    pub parameters: Value,
    pub handler: Arc<dyn ToolHandler>,
}

/// The tool registry.
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Re-registering a name replaces the old descriptor.
    pub fn register(&mut self, descriptor: ToolDescriptor) {
        tracing::debug!(tool = %descriptor.name, "Tool registered");
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Descriptors for prompt assembly, name-sorted.
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        let mut tools: Vec<&ToolDescriptor> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Invoke a tool by name. Required top-level properties from the schema
    /// are checked before the handler runs.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let descriptor = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        if let Some(required) = descriptor.parameters.get("required").and_then(Value::as_array) {
            for field in required.iter().filter_map(Value::as_str) {
                if arguments.get(field).is_none() {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required argument: {field}"
                    )));
                }
            }
        }

        descriptor.handler.invoke(arguments).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
            Ok(json!({ "echo": arguments }))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor {
            name: "get_patient_360".into(),
            description: "Fetch the composed patient view".into(),
            parameters: json!({
                "type": "object",
                "properties": { "patient_id": { "type": "string" } },
                "required": ["patient_id"]
            }),
            handler: Arc::new(EchoTool),
        });
        registry
    }

    #[tokio::test]
    async fn test_invoke() {
        let registry = registry();
        let result = registry
            .invoke("get_patient_360", json!({ "patient_id": "Patient/1" }))
            .await
            .unwrap();
        assert_eq!(result["echo"]["patient_id"], "Patient/1");
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let registry = registry();
        let error = registry.invoke("get_patient_360", json!({})).await.unwrap_err();
        assert!(matches!(error, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = registry();
        let error = registry.invoke("nope", json!({})).await.unwrap_err();
        assert!(matches!(error, ToolError::UnknownTool(_)));
    }

    #[test]
    fn test_list_sorted() {
        let mut registry = registry();
        registry.register(ToolDescriptor {
            name: "analyze_trend".into(),
            description: "Trend fit".into(),
            parameters: json!({"type": "object"}),
            handler: Arc::new(EchoTool),
        });

        let names: Vec<&str> = registry.list().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["analyze_trend", "get_patient_360"]);
    }
}
