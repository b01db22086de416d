//! Debounced cache refresh and authorized key rotation.
//!
//! [`CacheRefreshCoordinator`] is the single entry point request handling
//! uses to touch the key lifecycle:
//!
//! - [`update_cache`](CacheRefreshCoordinator::update_cache) runs after
//!   every response and refreshes the [`KeyCache`] at most once per
//!   `refresh_interval`, however many requests race into it.
//! - [`rotate_jwks`](CacheRefreshCoordinator::rotate_jwks) generates and
//!   persists a new signing key for an authorized caller. It never touches
//!   the cache; the next effective refresh picks the key up.
//!
//! # Debounce
//!
//! ```text
//!  t ──────────────────────────────────────────────────────────►
//!      │ refresh │   no-op   no-op   no-op   │ refresh │  no-op
//!      └──────── refresh_interval ───────────┘
//! ```
//!
//! The window is claimed before the refresh runs, so concurrent callers in
//! the same window return immediately. A failed refresh releases the claim
//! and the next call retries.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::RwLock;
use sigil_storage::SigningKeyRepository;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    backend_auth::{BackendServiceAuth, IdentityTokenVerifier},
    config::AuthConfig,
    error::Result,
    key_cache::KeyCache,
    keygen::{Ed25519KeyGenerator, KeyGenerator, KeyNameGenerator, UuidKeyNameGenerator},
    rotation::{KeyRotationService, RotationOutcome},
};

/// Coordinates cache refreshes and key rotation.
///
/// Build once at process start and share behind an `Arc`.
pub struct CacheRefreshCoordinator {
    cache: Arc<KeyCache>,
    rotation: KeyRotationService,
    key_generator: Arc<dyn KeyGenerator>,
    name_generator: Arc<dyn KeyNameGenerator>,
    identity_verifier: Arc<dyn IdentityTokenVerifier>,
    refresh_interval: Duration,
    max_backups: usize,
    automation_user_agent: String,
    /// When the current debounce window was claimed; `None` until the
    /// first successful claim.
    last_updated: RwLock<Option<Instant>>,
    /// Number of successful cache refreshes.
    refresh_count: AtomicU64,
    /// Number of failed cache refreshes.
    refresh_errors_total: AtomicU64,
    /// Number of successful rotations.
    rotation_count: AtomicU64,
}

impl std::fmt::Debug for CacheRefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRefreshCoordinator")
            .field("refresh_interval", &self.refresh_interval)
            .field("max_backups", &self.max_backups)
            .field("last_updated", &*self.last_updated.read())
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl CacheRefreshCoordinator {
    /// Creates a coordinator.
    ///
    /// `repository` must be the store `cache` reads from. The key and name
    /// generators default to [`Ed25519KeyGenerator`] and
    /// [`UuidKeyNameGenerator`].
    #[builder]
    pub fn new(
        repository: Arc<dyn SigningKeyRepository>,
        cache: Arc<KeyCache>,
        identity_verifier: Arc<dyn IdentityTokenVerifier>,
        config: &AuthConfig,
        #[builder(default = Arc::new(Ed25519KeyGenerator) as Arc<dyn KeyGenerator>)]
        key_generator: Arc<dyn KeyGenerator>,
        #[builder(default = Arc::new(UuidKeyNameGenerator) as Arc<dyn KeyNameGenerator>)]
        name_generator: Arc<dyn KeyNameGenerator>,
    ) -> Self {
        Self {
            cache,
            rotation: KeyRotationService::new(repository),
            key_generator,
            name_generator,
            identity_verifier,
            refresh_interval: config.refresh_interval(),
            max_backups: config.max_backups(),
            automation_user_agent: config.automation_user_agent().to_owned(),
            last_updated: RwLock::new(None),
            refresh_count: AtomicU64::new(0),
            refresh_errors_total: AtomicU64::new(0),
            rotation_count: AtomicU64::new(0),
        }
    }

    /// Refreshes the key cache unless it was refreshed within the last
    /// `refresh_interval`.
    ///
    /// Returns `true` if this call performed the refresh, `false` if it was
    /// debounced. Of any number of concurrent calls inside one window, at
    /// most one refreshes.
    ///
    /// # Errors
    ///
    /// Returns the [`KeyCache::refresh_cache`] error. The cache keeps its
    /// previous snapshot and the window is released so the next call
    /// retries.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn update_cache(&self, cancel: &CancellationToken) -> Result<bool> {
        let now = Instant::now();

        if self.is_fresh(*self.last_updated.read(), now) {
            tracing::debug!("key cache fresh; skipping refresh");
            return Ok(false);
        }

        let previous = {
            let mut last_updated = self.last_updated.write();
            if self.is_fresh(*last_updated, now) {
                tracing::debug!("key cache refreshed concurrently; skipping refresh");
                return Ok(false);
            }
            last_updated.replace(now)
        };

        match self.cache.refresh_cache(cancel).await {
            Ok(_) => {
                self.refresh_count.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            },
            Err(e) => {
                {
                    let mut last_updated = self.last_updated.write();
                    if *last_updated == Some(now) {
                        *last_updated = previous;
                    }
                }
                self.refresh_errors_total.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "key cache refresh failed; serving previous keys");
                Err(e)
            },
        }
    }

    /// Refreshes the key cache regardless of the debounce window.
    ///
    /// Used at process start, before the first request is served.
    ///
    /// # Errors
    ///
    /// Returns the [`KeyCache::refresh_cache`] error.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn force_refresh(&self, cancel: &CancellationToken) -> Result<usize> {
        match self.cache.refresh_cache(cancel).await {
            Ok(count) => {
                *self.last_updated.write() = Some(Instant::now());
                self.refresh_count.fetch_add(1, Ordering::Relaxed);
                Ok(count)
            },
            Err(e) => {
                self.refresh_errors_total.fetch_add(1, Ordering::Relaxed);
                Err(e)
            },
        }
    }

    /// Generates a new signing key and rotates it into the repository.
    ///
    /// With `auth`, the caller must be the expected automation principal
    /// (see [`BackendServiceAuth::authorize`]). `None` is for trusted
    /// in-process callers.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Unauthorized`](crate::AuthError::Unauthorized) if `auth` is rejected; no key is
    ///   generated or written
    /// - [`AuthError::KeyGeneration`](crate::AuthError::KeyGeneration) if key generation fails
    /// - any [`KeyRotationService::refresh`] error
    #[tracing::instrument(skip(self, auth, cancel), fields(authorized_caller = auth.is_some()))]
    pub async fn rotate_jwks(
        &self,
        auth: Option<&BackendServiceAuth>,
        cancel: &CancellationToken,
    ) -> Result<RotationOutcome> {
        if let Some(auth) = auth {
            let identity = auth
                .authorize(&self.automation_user_agent, self.identity_verifier.as_ref())
                .await
                .inspect_err(|e| {
                    tracing::warn!(
                        audit.action = "rotate_signing_key",
                        audit.resource = "signing_keys",
                        audit.result = "denied",
                        error = %e,
                        "audit_event"
                    );
                })?;
            tracing::debug!(principal = %identity.subject, "rotation caller authorized");
        }

        let key = self.key_generator.generate()?;
        let name = self.name_generator.next_name();
        let outcome = self.rotation.refresh(cancel, &key, &name, self.max_backups).await?;

        self.rotation_count.fetch_add(1, Ordering::Relaxed);
        Ok(outcome)
    }

    /// When the current debounce window began, if any refresh was claimed.
    #[must_use]
    pub fn last_refreshed(&self) -> Option<Instant> {
        *self.last_updated.read()
    }

    /// The shared key cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<KeyCache> {
        &self.cache
    }

    /// Number of successful cache refreshes.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::Relaxed)
    }

    /// Number of failed cache refreshes.
    #[must_use]
    pub fn refresh_errors_total(&self) -> u64 {
        self.refresh_errors_total.load(Ordering::Relaxed)
    }

    /// Number of successful rotations.
    #[must_use]
    pub fn rotation_count(&self) -> u64 {
        self.rotation_count.load(Ordering::Relaxed)
    }

    fn is_fresh(&self, last_updated: Option<Instant>, now: Instant) -> bool {
        last_updated.is_some_and(|last| now.saturating_duration_since(last) < self.refresh_interval)
    }
}
