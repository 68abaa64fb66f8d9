//! Application state: every service constructed once, then injected.

use std::sync::Arc;

use aegis_ai::providers::{AnthropicProvider, MockProvider, OllamaProvider, OpenAiProvider};
use aegis_ai::{LlmGateway, LlmProvider};
use aegis_connectors::ConnectorRegistry;
use aegis_cowork::SessionHub;
use aegis_data::DataService;
use aegis_governance::retention::{RetentionAction, RetentionPolicy};
use aegis_governance::{AuditService, ConsentEngine, PbacEngine, RetentionManager};
use aegis_graph::{GraphStore, InMemoryGraph};
use aegis_orchestrator::{InMemoryCheckpointStore, KillSwitch, WorkflowRunner};
use aegis_pipeline::{
    DataQualityValidator, IngestionPipeline, InMemoryPublisher, NormalizationEngine,
};
use aegis_pipeline::ingestion::RagIndex;
use aegis_terminology::{TerminologyService, VerifiedMappingStore};
use aegis_timeseries::TimeSeriesStore;
use aegis_vector::{HashEmbedder, InMemoryVectorStore};

use crate::config::AegisConfig;

/// Shared application state.
pub struct AppState {
    pub config: AegisConfig,
    pub audit: Arc<AuditService>,
    pub pbac: Arc<PbacEngine>,
    pub consent: Arc<ConsentEngine>,
    pub retention: Arc<RetentionManager>,
    pub kill_switch: Arc<KillSwitch>,
    pub graph: Arc<dyn GraphStore>,
    pub publisher: Arc<InMemoryPublisher>,
    pub pipeline: Arc<IngestionPipeline>,
    pub gateway: Arc<LlmGateway>,
    pub normalization: Arc<NormalizationEngine>,
    pub terminology: Arc<TerminologyService>,
    pub knowledge_base: Arc<VerifiedMappingStore>,
    pub data: Arc<DataService>,
    pub runner: Arc<WorkflowRunner>,
    pub timeseries: Arc<TimeSeriesStore>,
    pub hub: Arc<SessionHub>,
}

impl AppState {
    /// Build the full service graph from configuration.
    pub fn build(config: AegisConfig) -> Arc<Self> {
        let audit = Arc::new(AuditService::new());

        let pbac = Arc::new(PbacEngine::with_default_policies(audit.clone()));
        pbac.register_condition("mfa_missing", |request| !request.principal.mfa_verified);

        let consent = Arc::new(ConsentEngine::new(audit.clone()));

        let retention = Arc::new(RetentionManager::new());
        if let Some(days) = config.retention_audit_days {
            retention.register_policy(RetentionPolicy {
                id: "env-audit-log".into(),
                data_type: "audit_log".into(),
                retention_days: days,
                action: RetentionAction::Delete,
                archive_after_days: None,
            });
        }

        let kill_switch = Arc::new(KillSwitch::new());
        let graph: Arc<dyn GraphStore> = Arc::new(InMemoryGraph::new());
        let publisher = Arc::new(InMemoryPublisher::new());
        let terminology = Arc::new(TerminologyService::with_seed_catalog());
        let knowledge_base = Arc::new(VerifiedMappingStore::new());
        let timeseries = Arc::new(TimeSeriesStore::new());

        let gateway = Arc::new(LlmGateway::new(build_providers(&config)));

        let normalization = Arc::new(NormalizationEngine::new(
            knowledge_base.clone(),
            terminology.clone(),
            Some(gateway.clone()),
            audit.clone(),
        ));

        let pipeline = Arc::new(IngestionPipeline::new(
            ConnectorRegistry::with_default_connectors(),
            Some(DataQualityValidator::with_default_rules()),
            graph.clone(),
            publisher.clone(),
            Some(RagIndex {
                embedder: Arc::new(HashEmbedder::default()),
                store: Arc::new(InMemoryVectorStore::new()),
            }),
            audit.clone(),
        ));

        let data = Arc::new(DataService::new(graph.clone()));
        let runner = Arc::new(WorkflowRunner::new(
            Arc::new(InMemoryCheckpointStore::new()),
            kill_switch.clone(),
        ));

        Arc::new(Self {
            config,
            audit,
            pbac,
            consent,
            retention,
            kill_switch,
            graph,
            publisher,
            pipeline,
            gateway,
            normalization,
            terminology,
            knowledge_base,
            data,
            runner,
            timeseries,
            hub: Arc::new(SessionHub::new()),
        })
    }
}

/// Providers in failover order, from configuration. Mock mode (explicit or
/// credential-less) routes everything to the deterministic mock.
fn build_providers(config: &AegisConfig) -> Vec<Arc<dyn LlmProvider>> {
    if config.mock_llm || !config.has_llm_credentials() {
        if !config.mock_llm {
            tracing::warn!("no LLM credentials configured, falling back to mock provider");
        }
        return vec![Arc::new(MockProvider::new()) as Arc<dyn LlmProvider>];
    }

    let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::new();
    if let Some(key) = &config.anthropic_api_key {
        providers.push(Arc::new(AnthropicProvider::new(key, "claude-3-5-sonnet-latest")));
    }
    if let Some(key) = &config.openai_api_key {
        providers.push(Arc::new(OpenAiProvider::new(key, "gpt-4-turbo")));
    }
    if let Some(base_url) = &config.ollama_base_url {
        providers.push(Arc::new(
            OllamaProvider::new("llama3.1").with_base_url(base_url),
        ));
    }
    providers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_wires_mock_gateway() {
        let state = AppState::build(AegisConfig::default());
        assert_eq!(state.gateway.provider_names(), vec!["mock"]);
        assert!(!state.pipeline.sources().is_empty());
    }

    #[test]
    fn test_provider_order_follows_config() {
        let config = AegisConfig {
            mock_llm: false,
            anthropic_api_key: Some("key-a".into()),
            openai_api_key: Some("key-b".into()),
            ..Default::default()
        };
        let providers = build_providers(&config);
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["anthropic", "openai"]);
    }
}
