//! In-memory snapshot of the active signing keys.
//!
//! [`KeyCache`] sits on the hot path of every authenticated request: readers
//! take the current [`KeySnapshot`] under a read lock (an `Arc` clone) and
//! never observe a partially rebuilt key set. [`KeyCache::refresh_cache`]
//! builds a complete replacement off-lock and swaps it in with one write.
//!
//! ```text
//!   refresh_cache ── list() ──► build snapshot ──► swap (write lock)
//!                                                    │
//!   get_private / list_public ──► read lock ──► Arc<KeySnapshot>
//! ```
//!
//! # Grace period
//!
//! [`KeyCache::get_private`] returns the newest key, the one new tokens are
//! signed with. [`KeyCache::list_public`] returns every retained key, so a
//! token signed just before a rotation keeps verifying until its key is
//! pruned.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use ed25519_dalek::{SECRET_KEY_LENGTH, SigningKey, VerifyingKey};
use fail::fail_point;
use jsonwebtoken::{DecodingKey, EncodingKey};
use parking_lot::RwLock;
use sigil_storage::{SigningKeyRecord, SigningKeyRepository, StorageError};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::{
    cancellation::cancellable,
    error::{AuthError, Result},
};

/// A cached private signing key with its derived public half.
pub struct CachedSigningKey {
    name: String,
    created_at: DateTime<Utc>,
    signing_key: SigningKey,
    encoding_key: EncodingKey,
    public: PublicKey,
}

impl std::fmt::Debug for CachedSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSigningKey")
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .field("signing_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl CachedSigningKey {
    /// Builds a cached key from a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if the record does not hold a
    /// 32-byte Ed25519 secret key.
    pub fn from_record(record: &SigningKeyRecord) -> Result<Self> {
        let seed: Zeroizing<[u8; SECRET_KEY_LENGTH]> =
            Zeroizing::new(record.key_bytes().try_into().map_err(|_| {
                AuthError::validation(format!(
                    "signing key '{}' must be {SECRET_KEY_LENGTH} bytes, got {}",
                    record.name,
                    record.key_bytes().len()
                ))
            })?);
        let signing_key = SigningKey::from_bytes(&seed);

        Self::from_signing_key(record.name.clone(), record.created_at, signing_key)
    }

    /// Builds a cached key from an Ed25519 key pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if the public key cannot be turned
    /// into a verification key.
    pub fn from_signing_key(
        name: String,
        created_at: DateTime<Utc>,
        signing_key: SigningKey,
    ) -> Result<Self> {
        let encoding_key = EncodingKey::from_ed_der(&pkcs8_der(&signing_key));
        let public = PublicKey::new(name.clone(), signing_key.verifying_key())?;
        Ok(Self { name, created_at, signing_key, encoding_key, public })
    }

    /// Record name, used as the token `kid`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the key was written.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Key used to sign tokens.
    #[must_use]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Raw Ed25519 signing key.
    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Public half of this key.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

/// Wraps a raw Ed25519 secret in the PKCS#8 v1 DER envelope jsonwebtoken
/// expects for `EncodingKey::from_ed_der`.
fn pkcs8_der(signing_key: &SigningKey) -> Zeroizing<Vec<u8>> {
    let secret: Zeroizing<[u8; SECRET_KEY_LENGTH]> = Zeroizing::new(signing_key.to_bytes());
    let mut der = Zeroizing::new(vec![
        0x30, 0x2e, // SEQUENCE, 46 bytes
        0x02, 0x01, 0x00, // INTEGER version 0
        0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
        0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
        0x04, 0x22, // OCTET STRING, 34 bytes
        0x04, 0x20, // OCTET STRING, 32 bytes
    ]);
    der.extend_from_slice(&*secret);
    der
}

/// A verification key derived from a cached signing key.
#[derive(Clone)]
pub struct PublicKey {
    name: String,
    verifying_key: VerifyingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("name", &self.name)
            .field("key", &self.to_base64url())
            .finish()
    }
}

impl PublicKey {
    /// Wraps an Ed25519 verifying key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if jsonwebtoken rejects the key.
    pub fn new(name: impl Into<String>, verifying_key: VerifyingKey) -> Result<Self> {
        let encoded = URL_SAFE_NO_PAD.encode(verifying_key.as_bytes());
        let decoding_key = DecodingKey::from_ed_components(&encoded)
            .map_err(|e| AuthError::validation(format!("invalid Ed25519 public key: {e}")))?;
        Ok(Self { name: name.into(), verifying_key, decoding_key })
    }

    /// Name of the signing key this belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw Ed25519 verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Key used to verify token signatures.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// The 32-byte public key as base64url without padding.
    #[must_use]
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.verifying_key.as_bytes())
    }
}

/// An immutable, newest-first set of cached keys.
///
/// Snapshots are replaced wholesale on refresh and never mutated.
#[derive(Debug, Default)]
pub struct KeySnapshot {
    keys: Vec<Arc<CachedSigningKey>>,
}

impl KeySnapshot {
    /// The newest key, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Arc<CachedSigningKey>> {
        self.keys.first()
    }

    /// Every cached key, newest first.
    #[must_use]
    pub fn keys(&self) -> &[Arc<CachedSigningKey>] {
        &self.keys
    }

    /// Public halves of every cached key, newest first.
    #[must_use]
    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.keys.iter().map(|key| key.public_key().clone()).collect()
    }

    /// Names of every cached key, newest first.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.keys.iter().map(|key| key.name()).collect()
    }

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Read-mostly cache of the repository's signing keys.
///
/// Construct one per process and share it behind an `Arc`.
pub struct KeyCache {
    repository: Arc<dyn SigningKeyRepository>,
    snapshot: RwLock<Arc<KeySnapshot>>,
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache").field("keys", &self.snapshot().names()).finish_non_exhaustive()
    }
}

impl KeyCache {
    /// Creates an empty cache over `repository`.
    ///
    /// Call [`refresh_cache`](Self::refresh_cache) before serving requests.
    #[must_use]
    pub fn new(repository: Arc<dyn SigningKeyRepository>) -> Self {
        Self { repository, snapshot: RwLock::new(Arc::new(KeySnapshot::default())) }
    }

    /// Reloads every key from the repository and swaps in a new snapshot.
    ///
    /// Repository order is preserved. Returns the number of cached keys.
    ///
    /// # Errors
    ///
    /// On any error the previous snapshot stays in place.
    ///
    /// - [`AuthError::KeyStorage`] if listing fails or the context is cancelled
    /// - [`AuthError::Validation`] if a record does not hold a valid Ed25519 key
    #[tracing::instrument(skip(self, cancel))]
    pub async fn refresh_cache(&self, cancel: &CancellationToken) -> Result<usize> {
        fail_point!("cache-before-list", |_| {
            Err(AuthError::key_storage("list", StorageError::internal("injected failure before key list")))
        });

        let records = match cancellable(cancel, "list", self.repository.list()).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "key list failed; keeping previous snapshot");
                return Err(AuthError::key_storage("list", e));
            },
        };

        if records.windows(2).any(|pair| pair[0].created_at < pair[1].created_at) {
            tracing::warn!("repository returned keys out of creation order; using repository order");
        }

        let mut keys = Vec::with_capacity(records.len());
        for record in &records {
            match CachedSigningKey::from_record(record) {
                Ok(key) => keys.push(Arc::new(key)),
                Err(e) => {
                    tracing::error!(key = %record.name, error = %e, "unusable signing key; keeping previous snapshot");
                    return Err(e);
                },
            }
        }

        let count = keys.len();
        let current = keys.first().map(|key| key.name().to_owned());
        *self.snapshot.write() = Arc::new(KeySnapshot { keys });

        tracing::info!(
            audit.action = "refresh_key_cache",
            audit.resource = "signing_keys",
            audit.result = "success",
            audit.key_count = count,
            current = current.as_deref().unwrap_or("<none>"),
            "audit_event"
        );

        Ok(count)
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<KeySnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// The newest cached key, used to sign new tokens.
    #[must_use]
    pub fn get_private(&self) -> Option<Arc<CachedSigningKey>> {
        self.snapshot.read().current().cloned()
    }

    /// Public halves of every cached key, newest first.
    #[must_use]
    pub fn list_public(&self) -> Vec<PublicKey> {
        self.snapshot().public_keys()
    }

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    /// Whether no key is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.read().is_empty()
    }
}
