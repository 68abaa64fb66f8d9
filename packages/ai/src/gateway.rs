//! The gateway: ordered failover, deadline, guardrails, accounting.
//!
//! `complete` tries `[primary, ...fallbacks]` in order; every provider is
//! attempted at most once per request, and one end-to-end deadline covers
//! the whole chain. Rate limits, transient failures and non-retryable
//! domain errors all fall through to the next provider; what cannot fall
//! through is a guardrail block or deadline expiry.
//!
//! Usage is recorded only for responses actually received — an attempt cut
//! off by the deadline accrues nothing.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::guardrails::{Direction, GuardrailsEngine};
use crate::models::{GatewayError, LlmProvider, LlmRequest, LlmResponse, ProviderError};
use crate::usage::{UsageSnapshot, UsageTracker};

/// Chunk size for the streaming shim.
const STREAM_CHUNK_CHARS: usize = 24;

/// The LLM gateway. Constructed once at startup and injected.
pub struct LlmGateway {
    providers: Vec<Arc<dyn LlmProvider>>,
    guardrails: GuardrailsEngine,
    usage: UsageTracker,
}

impl LlmGateway {
    /// Gateway over `[primary, ...fallbacks]` in failover order.
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self {
            providers,
            guardrails: GuardrailsEngine::new(),
            usage: UsageTracker::new(),
        }
    }

    /// Provider names in failover order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Usage totals for this process.
    pub fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    /// Complete with failover. `deadline` bounds the entire chain.
    pub async fn complete(
        &self,
        request: &LlmRequest,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<LlmResponse, GatewayError> {
        if self.providers.is_empty() {
            return Err(GatewayError::NoProviders);
        }

        // Input guardrails
        let input_results = self.guardrails.run(&request.text(), Direction::Input);
        if GuardrailsEngine::should_block(&input_results) {
            return Err(GatewayError::GuardrailBlocked {
                violations: GuardrailsEngine::violations(&input_results),
            });
        }

        let mut last_error: Option<ProviderError> = None;
        for provider in &self.providers {
            let Some(remaining) = remaining_time(deadline) else {
                return Err(GatewayError::DeadlineExceeded);
            };

            let attempt = match remaining {
                Some(budget) => {
                    match tokio::time::timeout(budget, provider.complete(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout),
                    }
                }
                None => provider.complete(request).await,
            };

            match attempt {
                Ok(mut response) => {
                    self.usage.record(&response);

                    // Output guardrails
                    let output_results = self.guardrails.run(&response.content, Direction::Output);
                    if GuardrailsEngine::should_block(&output_results) {
                        return Err(GatewayError::GuardrailBlocked {
                            violations: GuardrailsEngine::violations(&output_results),
                        });
                    }
                    response.content =
                        GuardrailsEngine::apply_rewrites(&output_results, &response.content);

                    tracing::info!(
                        request_id = %request.request_id,
                        provider = %response.provider,
                        model = %response.model,
                        tokens = response.total_tokens(),
                        latency_ms = response.latency_ms,
                        tenant_id = request.tenant_id.as_deref().unwrap_or("-"),
                        "LLM request served"
                    );
                    return Ok(response);
                }
                Err(ProviderError::Timeout) => {
                    // The chain deadline ate this attempt; stop trying
                    tracing::warn!(provider = provider.name(), "provider attempt timed out");
                    return Err(GatewayError::DeadlineExceeded);
                }
                Err(error) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %error,
                        "provider failed, falling through"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(GatewayError::AllProvidersFailed {
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no providers attempted".to_string()),
        })
    }

    /// Streaming completion. Primary only; no mid-stream failover. The
    /// response is produced through the same guardrail path and then
    /// chunked onto the channel.
    pub async fn stream(
        &self,
        request: &LlmRequest,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<mpsc::Receiver<String>, GatewayError> {
        let Some(primary) = self.providers.first() else {
            return Err(GatewayError::NoProviders);
        };

        // Run the single-provider path with the same checks
        let single = LlmGateway {
            providers: vec![primary.clone()],
            guardrails: GuardrailsEngine::new(),
            usage: UsageTracker::new(),
        };
        let response = single.complete(request, deadline).await?;
        self.usage.record(&response);

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let chars: Vec<char> = response.content.chars().collect();
            for chunk in chars.chunks(STREAM_CHUNK_CHARS) {
                if tx.send(chunk.iter().collect::<String>()).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

fn remaining_time(deadline: Option<DateTime<Utc>>) -> Option<Option<Duration>> {
    match deadline {
        None => Some(None),
        Some(d) => {
            let remaining = d - Utc::now();
            if remaining <= chrono::Duration::zero() {
                None
            } else {
                Some(Some(Duration::from_millis(
                    remaining.num_milliseconds() as u64
                )))
            }
        }
    }
}
