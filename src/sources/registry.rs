//! Registry for bibliographic sources.

use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "source-arxiv")]
use super::arxiv::ArxivSource;
#[cfg(feature = "source-crossref")]
use super::crossref::CrossRefSource;
#[cfg(feature = "source-eupmc")]
use super::eupmc::EuropePmcSource;
#[cfg(feature = "source-ieee")]
use super::ieee::IeeeSource;
use super::{Source, SourceError};
use crate::config::HarvestConfig;
use crate::models::AssetKind;
use crate::utils::HttpClient;

bitflags::bitflags! {
    /// Asset kinds and extras a source can supply
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const XML = 1 << 0;
        const PDF = 1 << 1;
        const SUPPLEMENTARY = 1 << 2;
        const MINED_TERMS = 1 << 3;
        const HTML_URLS = 1 << 4;
    }
}

impl SourceCapabilities {
    /// Capability flag needed for an asset kind
    pub fn for_asset(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Xml => Self::XML,
            AssetKind::Pdf => Self::PDF,
            AssetKind::Supplementary => Self::SUPPLEMENTARY,
            AssetKind::MinedTerms => Self::MINED_TERMS,
        }
    }
}

/// Registry for all available sources
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Create a registry with every compiled-in source sharing one client
    #[allow(unused_variables, unused_mut)]
    pub fn from_config(client: &HttpClient, config: &HarvestConfig) -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "source-eupmc")]
        registry.register(Arc::new(EuropePmcSource::with_client(client.clone())));
        #[cfg(feature = "source-arxiv")]
        registry.register(Arc::new(ArxivSource::with_client(client.clone())));
        #[cfg(feature = "source-crossref")]
        registry.register(Arc::new(CrossRefSource::with_client(client.clone())));
        #[cfg(feature = "source-ieee")]
        registry.register(Arc::new(IeeeSource::with_client(
            client.clone(),
            config.api_keys.ieee.clone(),
        )));

        registry
    }

    /// Register a new source
    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(source.id().to_string(), source);
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.get(id)
    }

    /// Get a source by ID, returning an error if not found
    pub fn get_required(&self, id: &str) -> Result<&Arc<dyn Source>, SourceError> {
        self.get(id).ok_or_else(|| {
            let mut known: Vec<&str> = self.ids().collect();
            known.sort_unstable();
            SourceError::InvalidRequest(format!(
                "unknown source '{}' (available: {})",
                id,
                known.join(", ")
            ))
        })
    }

    /// Get all source IDs
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(|s| s.as_str())
    }

    /// Check if a source exists
    pub fn has(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// Get the number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
#[cfg(all(
    feature = "source-eupmc",
    feature = "source-arxiv",
    feature = "source-crossref",
    feature = "source-ieee"
))]
mod tests {
    use super::*;

    fn registry() -> SourceRegistry {
        SourceRegistry::from_config(&HttpClient::new().unwrap(), &HarvestConfig::default())
    }

    #[test]
    fn test_all_sources_registered() {
        let registry = registry();
        assert_eq!(registry.len(), 4);
        for id in ["eupmc", "arxiv", "crossref", "ieee"] {
            assert!(registry.has(id), "Source '{}' should be registered", id);
        }
    }

    #[test]
    fn test_get_required_unknown_source() {
        let err = registry().get_required("scopus").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("scopus"));
        assert!(msg.contains("arxiv, crossref, eupmc, ieee"));
    }

    #[test]
    fn test_capabilities() {
        let registry = registry();

        let eupmc = registry.get("eupmc").unwrap();
        for kind in AssetKind::ALL {
            assert!(eupmc.supports(kind), "EuropePMC should supply {}", kind);
        }

        let arxiv = registry.get("arxiv").unwrap();
        assert!(arxiv.supports(AssetKind::Pdf));
        assert!(arxiv.supports(AssetKind::Supplementary));
        assert!(!arxiv.supports(AssetKind::Xml));
        assert!(!arxiv.supports(AssetKind::MinedTerms));

        let ieee = registry.get("ieee").unwrap();
        assert!(ieee.capabilities().contains(SourceCapabilities::HTML_URLS));
        assert!(!ieee.supports(AssetKind::Pdf));
    }
}
