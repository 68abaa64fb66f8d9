//! Aegis-AI: LLM Gateway
//!
//! Provider-agnostic completion routing with:
//! - ordered failover (`[primary, ...fallbacks]`, one attempt per provider)
//! - a single end-to-end deadline across the whole fallback chain
//! - per-model cost accounting from provider-reported token counts
//! - input/output guardrails (prohibited content, PII, medical disclaimer)
//! - streaming from the primary only, no mid-stream failover
//!
//! Providers implement [`LlmProvider`]; the deterministic
//! [`providers::MockProvider`] is a first-class implementation selected in
//! mock mode and exercised throughout the test suite.

pub mod gateway;
pub mod guardrails;
pub mod models;
pub mod providers;
pub mod usage;

pub use gateway::LlmGateway;
pub use guardrails::{GuardrailAction, GuardrailResult, GuardrailsEngine};
pub use models::{
    GatewayError, LlmMessage, LlmProvider, LlmRequest, LlmResponse, ProviderError, Role,
};
pub use usage::{UsageSnapshot, UsageTracker};
