//! Signing-key storage contract for Sigil services.
//!
//! This crate defines the record type and repository trait that key
//! rotation and key caching are written against. Durable backends
//! (filesystem, cloud object store) implement [`auth::SigningKeyRepository`]
//! in the services that own them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 sigil-authn                              │
//! │   KeyRotationService (writes)   KeyCache (reads)         │
//! ├──────────────────────────────────────────────────────────┤
//! │                 sigil-storage                            │
//! │          SigningKeyRepository trait                      │
//! │            (write, list, delete)                         │
//! ├───────────────────────────┬──────────────────────────────┤
//! │ MemorySigningKeyRepository│  filesystem / object store   │
//! │        (testing)          │       (production)           │
//! └───────────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`]. Backends map their internal
//! errors onto [`StorageError`] variants.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with assertion macros and an instrumented
//!   repository wrapper for failure and latency injection. Enable this in `[dev-dependencies]`
//!   for integration tests.

#![deny(unsafe_code)]

pub mod auth;
pub mod error;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;

pub use auth::{MemorySigningKeyRepository, SigningKeyRecord, SigningKeyRepository};
pub use error::{BoxError, StorageError, StorageResult};
pub use zeroize::Zeroizing;
