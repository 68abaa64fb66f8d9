//! Connector registry keyed by [`SourceType`].
//!
//! Registration is an explicit call at startup; dispatch is a map lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cda::CdaConnector;
use crate::consent_docs::ConsentConnector;
use crate::dicom::DicomConnector;
use crate::fhir::FhirConnector;
use crate::hl7v2::Hl7v2Connector;
use crate::pro_sdoh::ProSdohConnector;
use crate::sdk::{Connector, SourceType};
use crate::wearables::WearablesConnector;
use crate::x12::{
    X12ClaimConnector, X12EligibilityConnector, X12PriorAuthConnector, X12RemittanceConnector,
};

/// Registry of connectors.
pub struct ConnectorRegistry {
    connectors: HashMap<SourceType, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Registry with every built-in connector registered.
    pub fn with_default_connectors() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FhirConnector));
        registry.register(Arc::new(Hl7v2Connector));
        registry.register(Arc::new(CdaConnector));
        registry.register(Arc::new(X12ClaimConnector));
        registry.register(Arc::new(X12RemittanceConnector));
        registry.register(Arc::new(X12EligibilityConnector));
        registry.register(Arc::new(X12PriorAuthConnector));
        registry.register(Arc::new(DicomConnector));
        registry.register(Arc::new(ProSdohConnector::pro()));
        registry.register(Arc::new(ProSdohConnector::sdoh()));
        registry.register(Arc::new(ConsentConnector));
        registry.register(Arc::new(WearablesConnector));
        registry
    }

    /// Register a connector under its declared type.
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        let source = connector.connector_type();
        tracing::debug!(source_type = %source, "Connector registered");
        self.connectors.insert(source, connector);
    }

    /// Resolve the connector for a source type.
    pub fn get(&self, source: SourceType) -> Option<Arc<dyn Connector>> {
        self.connectors.get(&source).cloned()
    }

    /// Registered source types, sorted by wire name.
    pub fn list_sources(&self) -> Vec<SourceType> {
        let mut sources: Vec<SourceType> = self.connectors.keys().copied().collect();
        sources.sort_by_key(|s| s.as_str());
        sources
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_default_connectors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_all_sources() {
        let registry = ConnectorRegistry::with_default_connectors();
        for source in SourceType::ALL {
            assert!(registry.get(source).is_some(), "missing connector: {source}");
        }
        assert_eq!(registry.len(), SourceType::ALL.len());
    }

    #[test]
    fn test_connector_type_matches_key() {
        let registry = ConnectorRegistry::with_default_connectors();
        for source in registry.list_sources() {
            assert_eq!(registry.get(source).unwrap().connector_type(), source);
        }
    }
}
