//! Provider registry and routing.
//!
//! The router owns the list of configured provider adapters and selects one
//! for each run: an explicitly preferred provider wins when available,
//! otherwise the available provider with the lowest priority value.

use crate::provider::adapter::Provider;
use crate::provider::types::ProviderError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry of configured providers with priority-based selection
#[derive(Clone)]
pub struct ProviderRouter {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderRouter {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    /// All registered providers, regardless of availability
    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// Look up a provider by its configured identifier
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                name: name.to_string(),
            })
    }

    /// Providers whose most recent availability probe succeeded
    pub async fn available_providers(&self) -> Vec<Arc<dyn Provider>> {
        let probes = self.providers.iter().map(|p| p.is_available());
        let results = futures::future::join_all(probes).await;
        self.providers
            .iter()
            .zip(results)
            .filter_map(|(provider, available)| available.then(|| Arc::clone(provider)))
            .collect()
    }

    /// Select a provider: the preferred one when named and available,
    /// otherwise the available provider with the lowest priority value
    pub async fn select_provider(
        &self,
        preferred: Option<&str>,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        let available = self.available_providers().await;

        if let Some(preferred) = preferred {
            if let Some(provider) = available.iter().find(|p| p.name() == preferred) {
                debug!("Selected preferred provider {}", preferred);
                return Ok(Arc::clone(provider));
            }
            warn!(
                "Preferred provider {} is not available; falling back by priority",
                preferred
            );
        }

        available
            .into_iter()
            .min_by_key(|p| p.priority())
            .ok_or(ProviderError::NoAvailableProviders)
    }
}
