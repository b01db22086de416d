//! # Sigil Authentication
//!
//! Signing-key lifecycle and token authentication for Sigil services.
//!
//! This crate provides:
//! - **Key rotation**: write a new Ed25519 signing key and prune backups beyond a retention bound
//! - **Key cache**: read-mostly, atomically swapped snapshot of the retained keys
//! - **Refresh coordination**: debounced post-response cache refresh and authorized rotation
//! - **Token codec**: EdDSA-signed tokens verified against every retained key
//! - **Authentication gate**: verification, login, and sliding-expiration renewal
//!
//! ## Architecture
//!
//! ```text
//!  RotationTrigger ──► CacheRefreshCoordinator ──► KeyRotationService ──┐
//!                              │ update_cache                           │ write/list/delete
//!  InterceptorChain ───────────┘                                        ▼
//!                              KeyCache ◄──────── list ─────── SigningKeyRepository
//!                                 ▲
//!  AuthenticationGate ── TokenCodec
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use sigil_authn::{
//!     AuthConfig, AuthenticationGate, CacheRefreshCoordinator, CredentialVerifier,
//!     IdentityTokenVerifier, KeyCache,
//! };
//! use sigil_storage::MemorySigningKeyRepository;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     identity: Arc<dyn IdentityTokenVerifier>,
//! #     users: Arc<dyn CredentialVerifier>,
//! #     token: &str,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::default();
//! let repository = Arc::new(MemorySigningKeyRepository::new());
//! let cache = Arc::new(KeyCache::new(repository.clone()));
//!
//! let coordinator = CacheRefreshCoordinator::builder()
//!     .repository(repository)
//!     .cache(Arc::clone(&cache))
//!     .identity_verifier(identity)
//!     .config(&config)
//!     .build();
//! let startup = CancellationToken::new();
//! coordinator.rotate_jwks(None, &startup).await?;
//! coordinator.force_refresh(&startup).await?;
//!
//! let gate = AuthenticationGate::builder()
//!     .cache(cache)
//!     .credential_verifier(users)
//!     .config(&config)
//!     .build();
//! let outcome = gate.authenticate(token, true, Utc::now())?;
//! println!("user {} (renewed: {})", outcome.claims.user_id(), outcome.renewed);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Rotation-trigger caller authorization.
pub mod backend_auth;
mod cancellation;
/// Token encoding and verification.
pub mod codec;
/// Configuration.
pub mod config;
/// Debounced refresh and rotation coordination.
pub mod coordinator;
/// Authentication error types.
pub mod error;
/// Token authentication and renewal.
pub mod gate;
/// Post-response hooks.
pub mod interceptor;
/// In-memory signing-key cache.
pub mod key_cache;
/// Key and key-name generation.
pub mod keygen;
/// Key rotation and backup pruning.
pub mod rotation;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
/// Rotation trigger endpoint logic.
pub mod trigger;

// Re-export key types for convenience
pub use backend_auth::{BackendServiceAuth, IdentityTokenVerifier, VerifiedIdentity};
pub use codec::{ACCEPTED_ALGORITHMS, JwtTokenCodec, TokenClaims, TokenCodec};
pub use config::AuthConfig;
pub use coordinator::CacheRefreshCoordinator;
pub use error::{AuthError, Result};
pub use gate::{Authenticated, AuthenticationGate, CredentialVerifier, Credentials, IssuedToken};
pub use interceptor::{CacheRefreshInterceptor, InterceptorChain, ResponseInterceptor};
pub use key_cache::{CachedSigningKey, KeyCache, KeySnapshot, PublicKey};
pub use keygen::{Ed25519KeyGenerator, KeyGenerator, KeyNameGenerator, UuidKeyNameGenerator};
pub use rotation::{KeyRotationService, MAX_BACKUPS, MIN_BACKUPS, RotationOutcome};
pub use trigger::{RotationTrigger, TriggerStatus};
