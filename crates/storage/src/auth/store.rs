//! Repository contract for signing-key records.
//!
//! [`SigningKeyRepository`] is the seam between key rotation/caching and the
//! durable store (filesystem, cloud object store, ...). Production backends
//! live with the service that owns the storage; this crate ships only the
//! contract and [`MemorySigningKeyRepository`] for tests and development.
//!
//! # Ordering
//!
//! ```text
//!   write(D)          list()
//!  ─────────►  ┌───┬───┬───┬───┐
//!              │ D │ A │ B │ C │   newest first
//!              └───┴───┴───┴───┘
//! ```
//!
//! Callers rely on `list` being newest-first and never re-sort.
//!
//! # Usage
//!
//! ```no_run
//! // Demonstrates the trait interface; requires a concrete repository.
//! use sigil_storage::auth::{SigningKeyRecord, SigningKeyRepository};
//! use sigil_storage::StorageResult;
//!
//! async fn newest<R: SigningKeyRepository>(repo: &R) -> StorageResult<Option<SigningKeyRecord>> {
//!     Ok(repo.list().await?.into_iter().next())
//! }
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::{
    auth::SigningKeyRecord,
    error::{StorageError, StorageResult},
};

/// Durable store of signing-key records.
///
/// # Error Handling
///
/// Implementations map backend failures onto [`StorageError`]. Writes must
/// be all-or-nothing: a failed `write` leaves no partial record behind.
#[async_trait]
pub trait SigningKeyRepository: Send + Sync {
    /// Persists `key` under `name` and returns the stored record.
    ///
    /// The repository stamps `created_at`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`] if a record named `name` already exists
    /// - a backend error if the store is unavailable
    async fn write(&self, name: &str, key: &[u8]) -> StorageResult<SigningKeyRecord>;

    /// Lists every stored record, newest first.
    async fn list(&self) -> StorageResult<Vec<SigningKeyRecord>>;

    /// Deletes the record named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such record exists.
    async fn delete(&self, name: &str) -> StorageResult<()>;
}

#[derive(Debug, Clone)]
struct StoredRecord {
    seq: u64,
    record: SigningKeyRecord,
}

/// In-memory [`SigningKeyRepository`] for tests and development.
///
/// Records are ordered by write sequence, so `list` is newest-first even
/// when two writes land in the same clock tick. Clones share state.
///
/// # Examples
///
/// ```
/// use sigil_storage::auth::{MemorySigningKeyRepository, SigningKeyRepository};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let repo = MemorySigningKeyRepository::new();
///     repo.write("key-a", &[1u8; 32]).await?;
///     repo.write("key-b", &[2u8; 32]).await?;
///
///     let names: Vec<_> = repo.list().await?.into_iter().map(|r| r.name).collect();
///     assert_eq!(names, ["key-b", "key-a"]);
///     Ok(())
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemorySigningKeyRepository {
    records: Arc<RwLock<Vec<StoredRecord>>>,
    next_seq: Arc<AtomicU64>,
}

impl MemorySigningKeyRepository {
    /// Creates a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a fully-formed record, keeping its `created_at`.
    ///
    /// The record becomes the newest entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if the name is taken.
    pub fn insert(&self, record: SigningKeyRecord) -> StorageResult<()> {
        let mut records = self.records.write();
        if records.iter().any(|stored| stored.record.name == record.name) {
            return Err(StorageError::conflict(record.name));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        records.push(StoredRecord { seq, record });
        Ok(())
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Names of stored records, newest first.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.sorted().into_iter().map(|record| record.name).collect()
    }

    fn sorted(&self) -> Vec<SigningKeyRecord> {
        let records = self.records.read();
        let mut stored: Vec<&StoredRecord> = records.iter().collect();
        stored.sort_by(|a, b| b.seq.cmp(&a.seq));
        stored.into_iter().map(|stored| stored.record.clone()).collect()
    }
}

#[async_trait]
impl SigningKeyRepository for MemorySigningKeyRepository {
    #[tracing::instrument(skip(self, key))]
    async fn write(&self, name: &str, key: &[u8]) -> StorageResult<SigningKeyRecord> {
        let record = SigningKeyRecord::builder()
            .name(name)
            .key(key.to_vec())
            .created_at(Utc::now())
            .build();
        self.insert(record.clone())?;
        Ok(record)
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self) -> StorageResult<Vec<SigningKeyRecord>> {
        Ok(self.sorted())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, name: &str) -> StorageResult<()> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|stored| stored.record.name != name);
        if records.len() == before {
            return Err(StorageError::not_found(name));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{assert_conflict, assert_not_found};

    #[tokio::test]
    async fn test_write_and_list() {
        let repo = MemorySigningKeyRepository::new();

        let written = repo.write("key-1", &[9u8; 32]).await.expect("write should succeed");
        assert_eq!(written.name, "key-1");
        assert_eq!(written.key_bytes(), &[9u8; 32]);

        let listed = repo.list().await.expect("list should succeed");
        assert_eq!(listed, vec![written]);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let repo = MemorySigningKeyRepository::new();
        for name in ["a", "b", "c", "d"] {
            repo.write(name, &[1u8; 32]).await.expect("write");
        }

        assert_eq!(repo.names(), ["d", "c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_insert_keeps_created_at_and_becomes_newest() {
        let repo = MemorySigningKeyRepository::new();
        repo.write("fresh", &[1u8; 32]).await.expect("write");

        let old_at = Utc::now() - Duration::days(30);
        let seeded = SigningKeyRecord::builder().name("seeded").key(vec![2u8; 32]).created_at(old_at).build();
        repo.insert(seeded).expect("insert");

        let listed = repo.list().await.expect("list");
        assert_eq!(listed[0].name, "seeded");
        assert_eq!(listed[0].created_at, old_at);
    }

    #[tokio::test]
    async fn test_write_duplicate_name_conflicts() {
        let repo = MemorySigningKeyRepository::new();
        repo.write("dup", &[1u8; 32]).await.expect("first write");

        let result = repo.write("dup", &[2u8; 32]).await;

        assert_conflict!(result);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = MemorySigningKeyRepository::new();
        repo.write("a", &[1u8; 32]).await.expect("write a");
        repo.write("b", &[1u8; 32]).await.expect("write b");

        repo.delete("a").await.expect("delete should succeed");

        assert_eq!(repo.names(), ["b"]);
    }

    #[tokio::test]
    async fn test_delete_nonexistent() {
        let repo = MemorySigningKeyRepository::new();

        let result = repo.delete("ghost").await;

        assert_not_found!(result);
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let repo = MemorySigningKeyRepository::new();
        let clone = repo.clone();

        clone.write("shared", &[1u8; 32]).await.expect("write");

        assert_eq!(repo.len(), 1);
        assert!(!repo.is_empty());
    }
}
