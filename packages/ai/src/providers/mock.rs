//! Mock providers.
//!
//! [`MockProvider`] is the first-class mock-mode implementation: fully
//! deterministic, no network, stable token counts. [`ScriptedProvider`]
//! plays back a queue of outcomes for failover tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::models::{LlmProvider, LlmRequest, LlmResponse, ProviderError, Role};

/// Deterministic mock: echoes a canned completion derived from the last
/// user message. Selected when the platform runs in mock mode.
pub struct MockProvider {
    name: String,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let content = format!("[mock completion] {last_user}");
        let input_tokens = (request.text().len() / 4) as u64;
        let output_tokens = (content.len() / 4) as u64;

        Ok(LlmResponse {
            content,
            model: request.model.clone().unwrap_or_else(|| "mock-1".to_string()),
            provider: self.name.clone(),
            input_tokens,
            output_tokens,
            latency_ms: 0,
            stop_reason: Some("end_turn".to_string()),
        })
    }
}

/// Outcome a scripted provider plays back.
pub enum ScriptedOutcome {
    Reply(String),
    RateLimited,
    Transient(String),
    Invalid(String),
}

/// Plays back a fixed sequence of outcomes, then rate-limits.
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<ScriptedOutcome>>,
    calls: Mutex<u32>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>, script: Vec<ScriptedOutcome>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.into()),
            calls: Mutex::new(0),
        }
    }

    /// How many times `complete` was invoked.
    pub fn call_count(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        *self.calls.lock() += 1;
        match self.script.lock().pop_front() {
            Some(ScriptedOutcome::Reply(content)) => Ok(LlmResponse {
                input_tokens: 10,
                output_tokens: (content.len() / 4).max(1) as u64,
                content,
                model: request.model.clone().unwrap_or_else(|| "scripted-1".to_string()),
                provider: self.name.clone(),
                latency_ms: 0,
                stop_reason: Some("end_turn".to_string()),
            }),
            Some(ScriptedOutcome::RateLimited) | None => Err(ProviderError::RateLimited {
                retry_after_secs: Some(30),
            }),
            Some(ScriptedOutcome::Transient(message)) => Err(ProviderError::Transient(message)),
            Some(ScriptedOutcome::Invalid(message)) => Err(ProviderError::InvalidRequest(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let provider = MockProvider::new();
        let request = LlmRequest::prompt("map this lab code");

        let a = provider.complete(&request).await.unwrap();
        let b = provider.complete(&request).await.unwrap();
        assert_eq!(a.content, b.content);
        assert_eq!(a.content, "[mock completion] map this lab code");
        assert_eq!(a.total_tokens(), b.total_tokens());
    }

    #[tokio::test]
    async fn test_scripted_playback() {
        let provider = ScriptedProvider::new(
            "flaky",
            vec![
                ScriptedOutcome::RateLimited,
                ScriptedOutcome::Reply("second try".into()),
            ],
        );
        let request = LlmRequest::prompt("x");

        assert!(matches!(
            provider.complete(&request).await,
            Err(ProviderError::RateLimited { .. })
        ));
        assert_eq!(provider.complete(&request).await.unwrap().content, "second try");
        assert_eq!(provider.call_count(), 2);
    }
}
