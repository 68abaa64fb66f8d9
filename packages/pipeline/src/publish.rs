//! Pub/sub producer contract and topic layout.
//!
//! Per source type: `<type>.raw`, `<type>.validated`, `<type>.dlq`.
//! Platform-wide: `aegis.events` and `aegis.agent.actions`.

use aegis_connectors::SourceType;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Topic names.
pub mod topics {
    use aegis_connectors::SourceType;

    pub const PLATFORM_EVENTS: &str = "aegis.events";
    pub const AGENT_ACTIONS: &str = "aegis.agent.actions";

    pub fn raw(source: SourceType) -> String {
        format!("{source}.raw")
    }

    pub fn validated(source: SourceType) -> String {
        format!("{source}.validated")
    }

    pub fn dlq(source: SourceType) -> String {
        format!("{source}.dlq")
    }
}

/// Publish errors.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("broker unavailable: {0}")]
    Upstream(String),
}

/// Producer contract; the broker itself is an external collaborator.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one record. `key` is the partition key (tenant id on the
    /// ingest path).
    async fn publish(&self, topic: &str, key: &str, payload: Value) -> Result<(), PublishError>;
}

/// In-memory producer used in tests and mock mode.
pub struct InMemoryPublisher {
    records: RwLock<HashMap<String, Vec<(String, Value)>>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Records published to a topic, in order.
    pub fn records(&self, topic: &str) -> Vec<(String, Value)> {
        self.records.read().get(topic).cloned().unwrap_or_default()
    }

    pub fn count(&self, topic: &str) -> usize {
        self.records.read().get(topic).map(Vec::len).unwrap_or(0)
    }
}

impl Default for InMemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Value) -> Result<(), PublishError> {
        self.records
            .write()
            .entry(topic.to_string())
            .or_default()
            .push((key.to_string(), payload));
        Ok(())
    }
}

/// Convenience: the three per-source topics.
pub fn source_topics(source: SourceType) -> [String; 3] {
    [topics::raw(source), topics::validated(source), topics::dlq(source)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topic_names() {
        assert_eq!(topics::raw(SourceType::FhirR4), "fhir_r4.raw");
        assert_eq!(topics::validated(SourceType::Hl7v2), "hl7v2.validated");
        assert_eq!(topics::dlq(SourceType::X12_837), "x12_837.dlq");
    }

    #[tokio::test]
    async fn test_in_memory_publisher_orders_per_topic() {
        let publisher = InMemoryPublisher::new();
        publisher
            .publish("fhir_r4.validated", "tenant-a", json!({"n": 1}))
            .await
            .unwrap();
        publisher
            .publish("fhir_r4.validated", "tenant-a", json!({"n": 2}))
            .await
            .unwrap();

        let records = publisher.records("fhir_r4.validated");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].1["n"], 1);
        assert_eq!(records[1].1["n"], 2);
        assert_eq!(publisher.count("other"), 0);
    }
}
