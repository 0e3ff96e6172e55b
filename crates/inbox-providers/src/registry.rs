use std::collections::HashMap;
use std::sync::Arc;

use inbox_types::entities::Provider;

use crate::traits::ProviderAdapter;

/// Looks up the adapter for a channel's configured provider. A plain map
/// rather than a trait-object factory since the provider set is small and
/// fixed at compile time.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Provider, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(provider, adapter);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }
}
