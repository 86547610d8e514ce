//! Explicit provider registry.
//!
//! Constructed once at startup with every configured adapter and injected
//! into the pipeline and poller — there is no ambient/global lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::ProviderAdapter;

/// Immutable map of provider id to adapter.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own provider id. Replaces any
    /// previous adapter with the same id.
    pub fn register(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters
            .insert(adapter.provider_id().to_string(), adapter);
        self
    }

    /// Look up the adapter for a provider.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider_id).cloned()
    }

    /// All registered provider ids, sorted for deterministic iteration.
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::{RestAdapter, RestAdapterConfig};

    fn adapter(id: &str) -> Arc<dyn ProviderAdapter> {
        Arc::new(RestAdapter::new(
            id.to_string(),
            RestAdapterConfig::new("http://localhost:9999".to_string()),
        ))
    }

    #[test]
    fn lookup_returns_registered_adapter() {
        let registry = ProviderRegistry::new().register(adapter("dreamframe"));
        assert!(registry.get("dreamframe").is_some());
        assert!(registry.get("other").is_none());
    }

    #[test]
    fn provider_ids_sorted() {
        let registry = ProviderRegistry::new()
            .register(adapter("zeta"))
            .register(adapter("alpha"));
        assert_eq!(registry.provider_ids(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn registering_same_id_replaces() {
        let registry = ProviderRegistry::new()
            .register(adapter("dreamframe"))
            .register(adapter("dreamframe"));
        assert_eq!(registry.provider_ids().len(), 1);
    }
}
