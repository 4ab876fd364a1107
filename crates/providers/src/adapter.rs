//! The provider capability interface and the set of registered adapters.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use genjobs_core::provider::{PollPolicy, Provider, StatusResult};

use crate::error::ProviderError;

/// Per-provider strategy for polling and finalizing a generation job.
///
/// `finalize` is only ever invoked while the caller holds the
/// finalize guard for the job, so implementations need not defend
/// against concurrent invocation for the same artifact.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider this adapter serves.
    fn provider(&self) -> Provider;

    /// Poll cadence and tick budget for jobs of this provider.
    fn poll_policy(&self) -> PollPolicy;

    /// Ask the provider for the current status of `handle`.
    ///
    /// An `Err` means "no information this tick", never a job failure.
    async fn check_status(&self, handle: &str) -> Result<StatusResult, ProviderError>;

    /// Retrieve and persist a finished artifact, returning its durable URL.
    async fn finalize(&self, artifact_ref: &str) -> Result<String, ProviderError>;
}

/// Adapters keyed by the provider tag stored on each job record.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own [`ProviderAdapter::provider`] tag,
    /// replacing any previous adapter for that provider.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) -> &mut Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.adapters.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSet")
            .field("providers", &self.providers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct Fixed(Provider);

    #[async_trait]
    impl ProviderAdapter for Fixed {
        fn provider(&self) -> Provider {
            self.0
        }

        fn poll_policy(&self) -> PollPolicy {
            PollPolicy::new(Duration::from_secs(1), 3)
        }

        async fn check_status(&self, _handle: &str) -> Result<StatusResult, ProviderError> {
            Ok(StatusResult::Pending { progress: None })
        }

        async fn finalize(&self, artifact_ref: &str) -> Result<String, ProviderError> {
            Ok(format!("https://cdn/{artifact_ref}"))
        }
    }

    #[test]
    fn lookup_by_provider_tag() {
        let set = AdapterSet::new().with(Arc::new(Fixed(Provider::Sora)));
        assert!(set.get(Provider::Sora).is_some());
        assert!(set.get(Provider::Veo).is_none());
    }

    #[test]
    fn register_replaces_existing_adapter() {
        let mut set = AdapterSet::new();
        set.register(Arc::new(Fixed(Provider::Veo)));
        set.register(Arc::new(Fixed(Provider::Veo)));
        assert_eq!(set.providers(), vec![Provider::Veo]);
    }

    #[test]
    fn empty_set() {
        assert!(AdapterSet::new().is_empty());
    }
}
