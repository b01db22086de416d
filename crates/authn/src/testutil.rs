//! Shared test utilities for authentication testing.
//!
//! Helpers for producing signing keys, seeding a [`KeyCache`], crafting raw
//! tokens (for attack testing), and stub collaborators with observable
//! behavior. Feature-gated behind `testutil` so none of this leaks into
//! production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! sigil-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use sigil_authn::testutil::{seeded_cache, test_signing_key};
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use ed25519_dalek::SigningKey;
use rand_core::OsRng;
use sigil_storage::{MemorySigningKeyRepository, SigningKeyRepository};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::{
    backend_auth::{IdentityTokenVerifier, VerifiedIdentity},
    error::{AuthError, Result},
    gate::{CredentialVerifier, Credentials},
    key_cache::{CachedSigningKey, KeyCache},
    keygen::{Ed25519KeyGenerator, KeyGenerator, KeyNameGenerator},
};

/// Fresh random Ed25519 secret key bytes, as stored in a key record.
pub fn test_key_bytes() -> Zeroizing<Vec<u8>> {
    let signing_key = SigningKey::generate(&mut OsRng);
    Zeroizing::new(signing_key.to_bytes().to_vec())
}

/// A fresh random cached signing key named `name`.
///
/// # Panics
///
/// Panics if the key cannot be built (should not happen with a generated key).
pub fn test_signing_key(name: &str) -> CachedSigningKey {
    CachedSigningKey::from_signing_key(name.to_owned(), Utc::now(), SigningKey::generate(&mut OsRng))
        .expect("generated key must be usable")
}

/// Writes a fresh key for each name, in order, and returns the repository
/// with a cache refreshed from it.
///
/// The last name is the newest key.
///
/// # Panics
///
/// Panics if a write or the refresh fails.
pub async fn seeded_cache(names: &[&str]) -> (MemorySigningKeyRepository, Arc<KeyCache>) {
    let repo = MemorySigningKeyRepository::new();
    for name in names {
        repo.write(name, &test_key_bytes()).await.expect("seed key write");
    }
    let cache = Arc::new(KeyCache::new(Arc::new(repo.clone())));
    cache.refresh_cache(&CancellationToken::new()).await.expect("seed cache refresh");
    (repo, cache)
}

/// Creates a raw token string from arbitrary header and payload JSON.
///
/// The result is `{header_b64}.{payload_b64}.` with an empty signature,
/// for testing rejection of malformed or forged tokens.
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_token(header_json: &serde_json::Value, payload_json: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// [`KeyGenerator`] that counts calls and can be made to fail.
#[derive(Debug, Default)]
pub struct CountingKeyGenerator {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingKeyGenerator {
    /// Creates a generator producing real Ed25519 keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `generate` calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes subsequent calls fail with [`AuthError::KeyGeneration`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl KeyGenerator for CountingKeyGenerator {
    fn generate(&self) -> Result<Zeroizing<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthError::key_generation("injected generator failure"));
        }
        Ed25519KeyGenerator.generate()
    }
}

/// [`KeyNameGenerator`] producing `<prefix>-0001`, `<prefix>-0002`, ...
#[derive(Debug)]
pub struct SequentialKeyNameGenerator {
    prefix: String,
    next: AtomicUsize,
}

impl SequentialKeyNameGenerator {
    /// Creates a generator starting at 1.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), next: AtomicUsize::new(1) }
    }
}

impl KeyNameGenerator for SequentialKeyNameGenerator {
    fn next_name(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{n:04}", self.prefix)
    }
}

/// [`IdentityTokenVerifier`] backed by a fixed token → subject table.
#[derive(Debug, Default)]
pub struct StaticIdentityVerifier {
    tokens: HashMap<String, String>,
}

impl StaticIdentityVerifier {
    /// Creates a verifier that rejects every token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` as asserting `subject`.
    #[must_use]
    pub fn with_token(mut self, token: &str, subject: &str) -> Self {
        self.tokens.insert(token.to_owned(), subject.to_owned());
        self
    }
}

#[async_trait]
impl IdentityTokenVerifier for StaticIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity> {
        self.tokens
            .get(token)
            .map(|subject| VerifiedIdentity { subject: subject.clone() })
            .ok_or_else(AuthError::invalid_credentials)
    }
}

/// [`CredentialVerifier`] backed by a fixed user table.
#[derive(Debug, Default)]
pub struct StaticCredentialVerifier {
    users: HashMap<String, (String, String)>,
}

impl StaticCredentialVerifier {
    /// Creates a verifier with no users.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user that logs in as `user_id`.
    #[must_use]
    pub fn with_user(mut self, username: &str, password: &str, user_id: &str) -> Self {
        self.users.insert(username.to_owned(), (password.to_owned(), user_id.to_owned()));
        self
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentialVerifier {
    async fn verify(&self, credentials: &Credentials) -> Result<Option<String>> {
        Ok(self
            .users
            .get(&credentials.username)
            .filter(|(password, _)| *password == *credentials.password)
            .map(|(_, user_id)| user_id.clone()))
    }
}

/// Asserts that a [`Result<T, AuthError>`] is an `Err` matching the given [`AuthError`] variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use sigil_authn::assert_auth_error;
/// use sigil_authn::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::invalid_credentials());
/// assert_auth_error!(result, InvalidCredentials);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        match $result {
            result => assert!(
                matches!(result, Err($crate::error::AuthError::$variant { .. })),
                "expected AuthError::{}, got: {:?}",
                stringify!($variant),
                result,
            ),
        }
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        match $result {
            result => assert!(
                matches!(result, Err($crate::error::AuthError::$variant { .. })),
                "{}: expected AuthError::{}, got: {:?}",
                $msg,
                stringify!($variant),
                result,
            ),
        }
    };
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_key_bytes_are_fresh_seeds() {
        let a = test_key_bytes();
        let b = test_key_bytes();
        assert_eq!(a.len(), 32);
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_craft_raw_token_format() {
        let token = craft_raw_token(&json!({"alg": "none"}), &json!({"sub": "test"}));
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].is_empty());
    }

    #[tokio::test]
    async fn test_seeded_cache_newest_last() {
        let (repo, cache) = seeded_cache(&["a", "b"]).await;
        assert_eq!(repo.names(), ["b", "a"]);
        assert_eq!(cache.get_private().expect("current key").name(), "b");
    }

    #[test]
    fn test_sequential_names() {
        let names = SequentialKeyNameGenerator::new("key");
        assert_eq!(names.next_name(), "key-0001");
        assert_eq!(names.next_name(), "key-0002");
    }

    #[test]
    fn test_assert_auth_error_evaluates_result_once() {
        let calls = AtomicUsize::new(0);
        let owned = String::from("moved into the call");
        let reject = |value: String| -> Result<String> {
            calls.fetch_add(1, Ordering::SeqCst);
            drop(value);
            Err(AuthError::invalid_credentials())
        };

        assert_auth_error!(reject(owned), InvalidCredentials);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "expected AuthError::Validation")]
    fn test_assert_auth_error_reports_mismatch() {
        let result: Result<()> = Err(AuthError::invalid_credentials());
        assert_auth_error!(result, Validation);
    }

    #[tokio::test]
    async fn test_static_verifiers() {
        let identity = StaticIdentityVerifier::new().with_token("t", "svc@example.com");
        assert_eq!(identity.verify("t").await.expect("known token").subject, "svc@example.com");
        assert_auth_error!(identity.verify("x").await, InvalidCredentials);

        let users = StaticCredentialVerifier::new().with_user("alice", "pw", "user-1");
        let ok = users.verify(&Credentials::new("alice", "pw")).await.expect("lookup");
        assert_eq!(ok.as_deref(), Some("user-1"));
        let bad = users.verify(&Credentials::new("alice", "nope")).await.expect("lookup");
        assert!(bad.is_none());
    }
}
