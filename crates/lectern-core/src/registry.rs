//! Registry of configured providers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::traits::{Provider, ProviderHealth};

/// Providers available to the failover chain, keyed by id.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own id, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    /// Builder: register a provider.
    pub fn with(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Health of every registered provider.
    pub async fn health(&self) -> BTreeMap<String, ProviderHealth> {
        let checks = self.providers.iter().map(|(id, provider)| {
            let provider = Arc::clone(provider);
            let id = id.clone();
            async move { (id, provider.health_check().await) }
        });
        futures::future::join_all(checks).await.into_iter().collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}
