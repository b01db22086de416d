//! Post-response hooks.
//!
//! Services register [`ResponseInterceptor`]s on an [`InterceptorChain`]
//! and run the chain after each response is sent. The chain is how the key
//! cache stays current without a background timer: [`CacheRefreshInterceptor`]
//! calls [`CacheRefreshCoordinator::update_cache`], which is a cheap no-op
//! inside the debounce window.
//!
//! # Example
//!
//! ```no_run
//! // Requires a configured coordinator.
//! use std::sync::Arc;
//! use sigil_authn::{CacheRefreshCoordinator, CacheRefreshInterceptor, InterceptorChain};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn after_response(chain: &InterceptorChain, request: &CancellationToken) {
//!     chain.run_after_response(request).await;
//! }
//!
//! fn build(coordinator: Arc<CacheRefreshCoordinator>) -> InterceptorChain {
//!     let mut chain = InterceptorChain::new();
//!     chain.register(Arc::new(CacheRefreshInterceptor::new(coordinator)));
//!     chain
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::coordinator::CacheRefreshCoordinator;

/// A hook run after every response.
///
/// Hooks cannot fail the response; they handle their own errors.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Runs after the response has been produced.
    async fn after_response(&self, cancel: &CancellationToken);
}

/// Ordered set of registered [`ResponseInterceptor`]s.
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.interceptors.iter().map(|i| i.name()).collect();
        f.debug_struct("InterceptorChain").field("interceptors", &names).finish()
    }
}

impl InterceptorChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `interceptor`; hooks run in registration order.
    pub fn register(&mut self, interceptor: Arc<dyn ResponseInterceptor>) -> &mut Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Whether no hook is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Runs every hook in order.
    pub async fn run_after_response(&self, cancel: &CancellationToken) {
        for interceptor in &self.interceptors {
            tracing::trace!(interceptor = interceptor.name(), "running response interceptor");
            interceptor.after_response(cancel).await;
        }
    }
}

/// Refreshes the key cache after each response, subject to debounce.
#[derive(Debug)]
pub struct CacheRefreshInterceptor {
    coordinator: Arc<CacheRefreshCoordinator>,
}

impl CacheRefreshInterceptor {
    /// Creates the hook over `coordinator`.
    #[must_use]
    pub fn new(coordinator: Arc<CacheRefreshCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl ResponseInterceptor for CacheRefreshInterceptor {
    fn name(&self) -> &'static str {
        "cache_refresh"
    }

    async fn after_response(&self, cancel: &CancellationToken) {
        // Stale keys are served until a later refresh succeeds.
        if let Err(e) = self.coordinator.update_cache(cancel).await {
            tracing::warn!(error = %e, "post-response key cache refresh failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;
    use sigil_storage::{
        SigningKeyRepository, StorageError,
        testutil::{InstrumentedRepository, RepoOp},
    };

    use super::*;
    use crate::{AuthConfig, KeyCache, testutil::StaticIdentityVerifier};

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl ResponseInterceptor for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn after_response(&self, _cancel: &CancellationToken) {
            self.log.lock().push(self.name);
        }
    }

    fn coordinator(repo: Arc<InstrumentedRepository>) -> Arc<CacheRefreshCoordinator> {
        let dyn_repo: Arc<dyn SigningKeyRepository> = repo;
        let config =
            AuthConfig::builder().refresh_interval(Duration::from_secs(60)).build().unwrap();
        Arc::new(
            CacheRefreshCoordinator::builder()
                .repository(Arc::clone(&dyn_repo))
                .cache(Arc::new(KeyCache::new(dyn_repo)))
                .identity_verifier(Arc::new(StaticIdentityVerifier::new()))
                .config(&config)
                .build(),
        )
    }

    #[tokio::test]
    async fn test_chain_runs_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = InterceptorChain::new();
        chain
            .register(Arc::new(Recorder { name: "first", log: Arc::clone(&log) }))
            .register(Arc::new(Recorder { name: "second", log: Arc::clone(&log) }));

        chain.run_after_response(&CancellationToken::new()).await;

        assert_eq!(chain.len(), 2);
        assert_eq!(*log.lock(), ["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_refresh_hook_is_debounced() {
        let repo = Arc::new(InstrumentedRepository::new());
        let mut chain = InterceptorChain::new();
        chain.register(Arc::new(CacheRefreshInterceptor::new(coordinator(Arc::clone(&repo)))));

        for _ in 0..10 {
            chain.run_after_response(&CancellationToken::new()).await;
        }

        assert_eq!(repo.list_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_refresh_hook_swallows_errors() {
        let repo = Arc::new(InstrumentedRepository::new());
        repo.fail(RepoOp::List, Some(StorageError::timeout));
        let coordinator = coordinator(Arc::clone(&repo));
        let hook = CacheRefreshInterceptor::new(Arc::clone(&coordinator));

        hook.after_response(&CancellationToken::new()).await;

        assert_eq!(coordinator.refresh_errors_total(), 1);
    }
}
