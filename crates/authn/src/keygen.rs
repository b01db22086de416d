//! Signing-key and key-name generation.
//!
//! Rotation depends on two injected collaborators: a [`KeyGenerator`] that
//! produces fresh private key material and a [`KeyNameGenerator`] that names
//! the resulting record. The defaults are [`Ed25519KeyGenerator`] (OS
//! randomness) and [`UuidKeyNameGenerator`] (`key-<uuid v4>`).

use ed25519_dalek::{SECRET_KEY_LENGTH, SigningKey};
use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{AuthError, Result};

/// Produces private key material for a new signing key.
pub trait KeyGenerator: Send + Sync {
    /// Returns the raw private key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyGeneration`] if no key could be produced.
    fn generate(&self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Generates Ed25519 secret keys from the operating system RNG.
///
/// The output is the 32-byte secret scalar seed, the form stored in
/// [`SigningKeyRecord::key`](sigil_storage::SigningKeyRecord::key).
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519KeyGenerator;

impl KeyGenerator for Ed25519KeyGenerator {
    fn generate(&self) -> Result<Zeroizing<Vec<u8>>> {
        let mut seed = Zeroizing::new([0u8; SECRET_KEY_LENGTH]);
        OsRng
            .try_fill_bytes(&mut seed[..])
            .map_err(|e| AuthError::key_generation(format!("OS random source failed: {e}")))?;

        let signing_key = SigningKey::from_bytes(&seed);
        Ok(Zeroizing::new(signing_key.to_bytes().to_vec()))
    }
}

/// Produces unique names for newly rotated keys.
pub trait KeyNameGenerator: Send + Sync {
    /// Returns a name not used by any existing record.
    fn next_name(&self) -> String;
}

/// Names keys `key-<uuid v4>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidKeyNameGenerator;

impl KeyNameGenerator for UuidKeyNameGenerator {
    fn next_name(&self) -> String {
        format!("key-{}", uuid::Uuid::new_v4())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ed25519_generator_produces_seed() {
        let key = Ed25519KeyGenerator.generate().unwrap();
        assert_eq!(key.len(), SECRET_KEY_LENGTH);
    }

    #[test]
    fn test_ed25519_generator_is_random() {
        let a = Ed25519KeyGenerator.generate().unwrap();
        let b = Ed25519KeyGenerator.generate().unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_uuid_names_are_prefixed_and_unique() {
        let a = UuidKeyNameGenerator.next_name();
        let b = UuidKeyNameGenerator.next_name();

        assert!(a.starts_with("key-"));
        assert_eq!(a.len(), "key-".len() + 36);
        assert_ne!(a, b);
    }
}
