//! LLM provider implementations.
//!
//! Each provider translates the common request shape onto its wire API and
//! classifies HTTP failures onto [`crate::models::ProviderError`] so the
//! gateway's failover loop can decide what falls through.

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use mock::{MockProvider, ScriptedOutcome, ScriptedProvider};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::models::ProviderError;

/// Map an HTTP status onto a provider error.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: String) -> ProviderError {
    if status.as_u16() == 429 {
        ProviderError::RateLimited {
            retry_after_secs: None,
        }
    } else if status.as_u16() == 401 || status.as_u16() == 403 {
        ProviderError::Auth(body)
    } else if status.is_server_error() {
        ProviderError::Transient(format!("{status}: {body}"))
    } else {
        ProviderError::InvalidRequest(format!("{status}: {body}"))
    }
}

/// Map a reqwest transport failure onto a provider error.
pub(crate) fn classify_transport(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transient(error.to_string())
    }
}
