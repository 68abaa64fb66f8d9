//! Declarative environment configuration.
//!
//! Recognized variables:
//! - `AEGIS_BIND` — HTTP bind address (default `0.0.0.0:8080`)
//! - `AEGIS_DEFAULT_TENANT` — tenant for CLI operations (default `default`)
//! - `AEGIS_MOCK_LLM` — `1`/`true` routes all LLM traffic to the mock
//!   provider (always on when no provider credential is present)
//! - `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `OLLAMA_BASE_URL` — provider
//!   credentials/endpoints, in failover order
//! - `AEGIS_LLM_TIMEOUT_SECS` — end-to-end deadline for the failover chain
//! - `AEGIS_RETENTION_AUDIT_DAYS` — override for the audit-log window
//! - `DATABASE_URL` — Postgres for durable checkpoints (in-memory without)

use serde::{Deserialize, Serialize};

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AegisConfig {
    pub bind_addr: String,
    pub default_tenant: String,
    pub mock_llm: bool,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub ollama_base_url: Option<String>,
    pub llm_timeout_secs: u64,
    pub retention_audit_days: Option<i64>,
    pub database_url: Option<String>,
}

impl AegisConfig {
    pub fn from_env() -> Self {
        let truthy = |key: &str| {
            std::env::var(key)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };
        let optional = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        Self {
            bind_addr: optional("AEGIS_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            default_tenant: optional("AEGIS_DEFAULT_TENANT")
                .unwrap_or_else(|| "default".to_string()),
            mock_llm: truthy("AEGIS_MOCK_LLM"),
            anthropic_api_key: optional("ANTHROPIC_API_KEY"),
            openai_api_key: optional("OPENAI_API_KEY"),
            ollama_base_url: optional("OLLAMA_BASE_URL"),
            llm_timeout_secs: optional("AEGIS_LLM_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            retention_audit_days: optional("AEGIS_RETENTION_AUDIT_DAYS")
                .and_then(|v| v.parse().ok()),
            database_url: optional("DATABASE_URL"),
        }
    }

    /// Whether any real provider credential is configured.
    pub fn has_llm_credentials(&self) -> bool {
        self.anthropic_api_key.is_some()
            || self.openai_api_key.is_some()
            || self.ollama_base_url.is_some()
    }
}

impl Default for AegisConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            default_tenant: "default".to_string(),
            mock_llm: true,
            anthropic_api_key: None,
            openai_api_key: None,
            ollama_base_url: None,
            llm_timeout_secs: 60,
            retention_audit_days: None,
            database_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_mock() {
        let config = AegisConfig::default();
        assert!(config.mock_llm);
        assert!(!config.has_llm_credentials());
    }
}
