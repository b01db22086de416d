//! Authentication error types.
//!
//! Errors fall into four caller-facing kinds: validation (caller-fixable
//! input), credentials (any token or login failure, deliberately
//! undifferentiated), key storage (backing store failures) and
//! authorization (rotation trigger gate). Key generation and signing
//! failures get their own variants because they are internal faults.

use sigil_storage::StorageError;
use thiserror::Error;

/// Authentication and key-management errors.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases without a
/// semver-breaking change. Downstream match expressions must include a
/// wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Caller-fixable input error (bad retention bound, missing key, bad TTL).
    #[error("Validation error: {message}")]
    Validation {
        /// What was wrong with the input.
        message: String,
    },

    /// The presented token or login credentials were not accepted.
    ///
    /// Carries no detail on purpose: empty, malformed, expired and
    /// unverifiable tokens are indistinguishable to the caller.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The caller is not allowed to trigger key rotation.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Why the caller was rejected.
        message: String,
    },

    /// Storage backend error during a key operation.
    ///
    /// Wraps the original [`StorageError`] to preserve the full error source
    /// chain for debugging and structured logging.
    #[error("Key storage error during {operation}: {source}")]
    KeyStorage {
        /// The key operation that failed (`write`, `list`, `delete`).
        operation: &'static str,
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// A new key pair could not be generated.
    #[error("Key generation failed: {message}")]
    KeyGeneration {
        /// Description of the failure.
        message: String,
    },

    /// A token could not be signed.
    #[error("Token signing failed: {message}")]
    Signing {
        /// Description of the failure.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Creates a new `InvalidCredentials` error.
    #[must_use]
    pub fn invalid_credentials() -> Self {
        Self::InvalidCredentials
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    /// Wraps a storage error with the operation that produced it.
    #[must_use]
    pub fn key_storage(operation: &'static str, source: StorageError) -> Self {
        Self::KeyStorage { operation, source }
    }

    /// Creates a new `KeyGeneration` error.
    #[must_use]
    pub fn key_generation(message: impl Into<String>) -> Self {
        Self::KeyGeneration { message: message.into() }
    }

    /// Creates a new `Signing` error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing { message: message.into() }
    }

    /// Returns the wrapped storage error, if any.
    #[must_use]
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            Self::KeyStorage { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::validation("max_backups must be within 1..=32, got 0");
        assert_eq!(err.to_string(), "Validation error: max_backups must be within 1..=32, got 0");

        assert_eq!(AuthError::invalid_credentials().to_string(), "Invalid credentials");

        let err = AuthError::unauthorized("unexpected user agent");
        assert_eq!(err.to_string(), "Unauthorized: unexpected user agent");
    }

    #[test]
    fn test_key_storage_error_display() {
        let err = AuthError::key_storage("list", StorageError::connection("connection refused"));
        assert_eq!(
            err.to_string(),
            "Key storage error during list: Connection error: connection refused"
        );
    }

    #[test]
    fn test_key_storage_error_preserves_source_chain() {
        use std::error::Error;

        let err = AuthError::key_storage("delete", StorageError::not_found("key-1"));

        let source = err.source().expect("source chain must be preserved");
        assert_eq!(source.to_string(), "Key not found: key-1");
        assert!(matches!(err.storage_error(), Some(StorageError::NotFound { .. })));
    }

    #[test]
    fn test_key_storage_error_nested_source_chain() {
        use std::error::Error;

        let io = std::io::Error::other("socket closed");
        let err = AuthError::key_storage(
            "write",
            StorageError::connection_with_source("object store unreachable", io),
        );

        let level_1 = err.source().expect("level 1 source");
        assert_eq!(level_1.to_string(), "Connection error: object store unreachable");

        let level_2 = level_1.source().expect("level 2 source");
        assert_eq!(level_2.to_string(), "socket closed");
    }

    #[test]
    fn test_credentials_error_carries_no_detail() {
        assert!(AuthError::invalid_credentials().storage_error().is_none());
        assert!(std::error::Error::source(&AuthError::invalid_credentials()).is_none());
    }
}
