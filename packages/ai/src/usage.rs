//! Per-process usage accounting.
//!
//! Token counts come from provider responses; cost is computed against a
//! per-model price table (USD per 1K tokens). A cancelled or failed attempt
//! never accrues — only received responses are recorded.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::models::LlmResponse;

/// (input, output) USD per 1K tokens.
fn model_price(model: &str) -> (f64, f64) {
    match model {
        m if m.contains("opus") => (0.015, 0.075),
        m if m.contains("sonnet") => (0.003, 0.015),
        m if m.contains("haiku") => (0.00025, 0.00125),
        m if m.contains("gpt-4-turbo") => (0.01, 0.03),
        m if m.contains("gpt-4") => (0.03, 0.06),
        m if m.contains("gpt-3.5") => (0.0005, 0.0015),
        // Local models are free; unknown hosted models get a conservative rate
        m if m.contains("llama") || m.contains("ollama") => (0.0, 0.0),
        _ => (0.01, 0.03),
    }
}

/// Point-in-time usage totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub total_requests: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

/// Usage counter. One mutex, touched only on update.
pub struct UsageTracker {
    totals: Mutex<UsageSnapshot>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            totals: Mutex::new(UsageSnapshot::default()),
        }
    }

    /// Record a received response.
    pub fn record(&self, response: &LlmResponse) {
        let (input_rate, output_rate) = model_price(&response.model);
        let cost = (response.input_tokens as f64 / 1000.0) * input_rate
            + (response.output_tokens as f64 / 1000.0) * output_rate;

        let mut totals = self.totals.lock();
        totals.total_requests += 1;
        totals.total_tokens += response.total_tokens();
        totals.total_cost_usd += cost;
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let mut snapshot = self.totals.lock().clone();
        snapshot.total_cost_usd = (snapshot.total_cost_usd * 10_000.0).round() / 10_000.0;
        snapshot
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(model: &str, input: u64, output: u64) -> LlmResponse {
        LlmResponse {
            content: String::new(),
            model: model.into(),
            provider: "test".into(),
            input_tokens: input,
            output_tokens: output,
            latency_ms: 1,
            stop_reason: None,
        }
    }

    #[test]
    fn test_accumulates() {
        let tracker = UsageTracker::new();
        tracker.record(&response("claude-3-sonnet", 1000, 1000));
        tracker.record(&response("claude-3-sonnet", 500, 500));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.total_tokens, 3000);
        // 1.5K input * 0.003 + 1.5K output * 0.015
        assert!((snapshot.total_cost_usd - 0.027).abs() < 1e-9);
    }

    #[test]
    fn test_local_models_are_free() {
        let tracker = UsageTracker::new();
        tracker.record(&response("llama3.1", 5000, 5000));
        assert_eq!(tracker.snapshot().total_cost_usd, 0.0);
        assert_eq!(tracker.snapshot().total_tokens, 10_000);
    }

    #[test]
    fn test_unknown_model_fallback_rate() {
        let tracker = UsageTracker::new();
        tracker.record(&response("new-frontier-model", 1000, 0));
        assert!((tracker.snapshot().total_cost_usd - 0.01).abs() < 1e-9);
    }
}
