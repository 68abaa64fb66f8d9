//! Ollama local-model provider.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::models::{LlmProvider, LlmRequest, LlmResponse, ProviderError, Role};
use crate::providers::{classify_status, classify_transport};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama provider for locally-hosted models.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl OllamaProvider {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: default_model.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let body = json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": request.temperature },
        });

        let started = Utc::now();
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("malformed response: {e}")))?;

        Ok(LlmResponse {
            content: payload["message"]["content"].as_str().unwrap_or_default().to_string(),
            model,
            provider: self.name().to_string(),
            input_tokens: payload["prompt_eval_count"].as_u64().unwrap_or(0),
            output_tokens: payload["eval_count"].as_u64().unwrap_or(0),
            latency_ms: (Utc::now() - started).num_milliseconds().max(0) as u64,
            stop_reason: payload["done_reason"].as_str().map(String::from),
        })
    }
}
