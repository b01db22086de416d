//! Signing-key record type.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// A signing key as persisted by a [`SigningKeyRepository`](crate::auth::SigningKeyRepository).
///
/// Holds the raw private key material (an Ed25519 seed for the keys this
/// workspace generates), the unique record name, and the creation time.
/// Records are created on every rotation and deleted once they fall outside
/// the retention bound.
///
/// # Storage shape
///
/// ```json
/// {
///   "name": "key-5c1b1d0e-...",
///   "key": "<base64url, no padding>",
///   "created_at": "2024-01-15T10:30:00Z"
/// }
/// ```
///
/// The key material is wrapped in [`Zeroizing`] so it is scrubbed from
/// memory when the record is dropped, and it is redacted from `Debug`
/// output.
///
/// # Example
///
/// ```
/// use sigil_storage::auth::SigningKeyRecord;
///
/// let record = SigningKeyRecord::builder()
///     .name("key-2024-001")
///     .key(vec![7u8; 32])
///     .build();
///
/// assert_eq!(record.name, "key-2024-001");
/// assert_eq!(record.key_bytes().len(), 32);
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct SigningKeyRecord {
    /// Unique record name. Doubles as the token `kid` header.
    #[builder(into)]
    pub name: String,

    /// Raw private key material.
    #[serde(with = "key_material")]
    #[builder(into)]
    pub key: Zeroizing<Vec<u8>>,

    /// When the record was written to the backing store.
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl SigningKeyRecord {
    /// Returns the raw key material.
    #[must_use]
    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Whether the record carries no key material at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl fmt::Debug for SigningKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyRecord")
            .field("name", &self.name)
            .field("key", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

mod key_material {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use zeroize::Zeroizing;

    use super::URL_SAFE_NO_PAD;

    pub(super) fn serialize<S: Serializer>(
        key: &Zeroizing<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(URL_SAFE_NO_PAD.encode(key.as_slice()));
        serializer.serialize_str(&encoded)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Zeroizing<Vec<u8>>, D::Error> {
        let encoded = Zeroizing::new(String::deserialize(deserializer)?);
        URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map(Zeroizing::new)
            .map_err(|e| D::Error::custom(format!("invalid key material: {e}")))
    }
}
