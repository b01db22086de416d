//! Signing-key records and the repository contract that persists them.
//!
//! Rotation writes records through [`SigningKeyRepository`]; the key cache
//! reads them back (newest first) to build its verification set.
//!
//! # Examples
//!
//! ```
//! use sigil_storage::auth::{MemorySigningKeyRepository, SigningKeyRepository};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let repo = MemorySigningKeyRepository::new();
//! repo.write("key-abc123", &[42u8; 32]).await.unwrap();
//!
//! let records = repo.list().await.unwrap();
//! assert_eq!(records[0].name, "key-abc123");
//! # });
//! ```

mod signing_key;
mod store;

pub use signing_key::SigningKeyRecord;
pub use store::{MemorySigningKeyRepository, SigningKeyRepository};
