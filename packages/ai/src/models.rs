//! Request/response shapes and the provider contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Chat role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: Role,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub request_id: String,
    pub messages: Vec<LlmMessage>,
    /// Model override; providers fall back to their configured default
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub tenant_id: Option<String>,
}

impl LlmRequest {
    /// Single-user-message request with defaults.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            messages: vec![LlmMessage::user(text)],
            model: None,
            temperature: 0.7,
            max_tokens: 4096,
            tenant_id: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.messages.insert(0, LlmMessage::system(system));
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Concatenated text of all messages (guardrail input).
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    /// Provider that actually served the request
    pub provider: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
    pub stop_reason: Option<String>,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Provider-level failures, classified for the failover loop.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider-imposed throttling; triggers fallback
    #[error("rate limited by provider{}", retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// Transient upstream failure (5xx, connect errors)
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Non-retryable domain error (bad request, content policy)
    #[error("provider rejected request: {0}")]
    InvalidRequest(String),

    /// Credential problem
    #[error("provider authentication failed: {0}")]
    Auth(String),

    /// Per-attempt deadline elapsed
    #[error("provider call timed out")]
    Timeout,
}

/// Gateway-level failures surfaced to callers.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no providers configured")]
    NoProviders,

    #[error("all providers failed; last error: {last}")]
    AllProvidersFailed { last: String },

    #[error("guardrail blocked the request: {violations:?}")]
    GuardrailBlocked { violations: Vec<String> },

    #[error("deadline exceeded before a provider answered")]
    DeadlineExceeded,
}

/// The provider contract.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stable provider name used in responses and accounting.
    fn name(&self) -> &str;

    /// One completion attempt. The gateway enforces deadlines and failover;
    /// implementations just translate errors into [`ProviderError`].
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = LlmRequest::prompt("hello")
            .with_system("be terse")
            .with_model("claude-3-haiku")
            .with_tenant("tenant-a");

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.model.as_deref(), Some("claude-3-haiku"));
        assert!(request.text().contains("be terse"));
        assert!(request.text().contains("hello"));
    }

    #[test]
    fn test_total_tokens() {
        let response = LlmResponse {
            content: "hi".into(),
            model: "m".into(),
            provider: "p".into(),
            input_tokens: 10,
            output_tokens: 5,
            latency_ms: 3,
            stop_reason: None,
        };
        assert_eq!(response.total_tokens(), 15);
    }
}
