//! OpenAI chat-completions provider.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::models::{LlmProvider, LlmRequest, LlmResponse, ProviderError, Role};
use crate::providers::{classify_status, classify_transport};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            default_model: default_model.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let started = Utc::now();
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

        let content = payload["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .and_then(|choice| choice["message"]["content"].as_str())
            .unwrap_or_default()
            .to_string();

        Ok(LlmResponse {
            content,
            model: payload["model"].as_str().unwrap_or(&model).to_string(),
            provider: self.name().to_string(),
            input_tokens: payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: payload["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            latency_ms: (Utc::now() - started).num_milliseconds().max(0) as u64,
            stop_reason: payload["choices"]
                .as_array()
                .and_then(|choices| choices.first())
                .and_then(|choice| choice["finish_reason"].as_str())
                .map(String::from),
        })
    }
}
