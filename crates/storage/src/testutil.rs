//! Shared test utilities for signing-key repository testing.
//!
//! Feature-gated behind `testutil` so none of this leaks into production
//! builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! sigil-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use sigil_storage::testutil::{InstrumentedRepository, RepoOp};
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    auth::{MemorySigningKeyRepository, SigningKeyRecord, SigningKeyRepository},
    error::{StorageError, StorageResult},
};

/// Assert that a [`StorageResult`] is a [`StorageError::Conflict`].
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        match $result {
            result => assert!(
                matches!(result, Err($crate::error::StorageError::Conflict { .. })),
                "expected StorageError::Conflict, got: {:?}",
                result,
            ),
        }
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::NotFound`].
#[macro_export]
macro_rules! assert_not_found {
    ($result:expr) => {
        match $result {
            result => assert!(
                matches!(result, Err($crate::error::StorageError::NotFound { .. })),
                "expected StorageError::NotFound, got: {:?}",
                result,
            ),
        }
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::Cancelled`].
#[macro_export]
macro_rules! assert_cancelled {
    ($result:expr) => {
        match $result {
            result => assert!(
                matches!(result, Err($crate::error::StorageError::Cancelled { .. })),
                "expected StorageError::Cancelled, got: {:?}",
                result,
            ),
        }
    };
}

/// Assert that a [`StorageResult`] is `Ok`, returning the inner value.
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}

/// Repository operation selector for [`InstrumentedRepository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoOp {
    /// [`SigningKeyRepository::write`].
    Write,
    /// [`SigningKeyRepository::list`].
    List,
    /// [`SigningKeyRepository::delete`].
    Delete,
}

/// Builds a fresh error each time an injected failure fires.
pub type ErrorFactory = fn() -> StorageError;

#[derive(Default)]
struct Failures {
    write: Option<ErrorFactory>,
    list: Option<ErrorFactory>,
    /// `(name, factory)`: fail deletes of this record only.
    delete: Option<(Option<String>, ErrorFactory)>,
}

/// A [`MemorySigningKeyRepository`] wrapper that counts calls and can inject
/// failures, latency, and a start/release gate on `list`.
///
/// The gate lets a test hold a `list` call open while it inspects readers:
/// enable it, wait on [`list_started`](Self::list_started), do the checks,
/// then [`release_list`](Self::release_list).
pub struct InstrumentedRepository {
    /// The backing store. Seed it directly to bypass counters.
    pub inner: MemorySigningKeyRepository,
    failures: Mutex<Failures>,
    list_delay: Mutex<Duration>,
    gate_enabled: AtomicBool,
    started: Arc<Notify>,
    release: Arc<Notify>,
    writes: AtomicUsize,
    lists: AtomicUsize,
    deletes: Mutex<Vec<String>>,
}

impl Default for InstrumentedRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentedRepository {
    /// Wraps a new empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(MemorySigningKeyRepository::new())
    }

    /// Wraps an existing repository (clones share state).
    #[must_use]
    pub fn wrap(inner: MemorySigningKeyRepository) -> Self {
        Self {
            inner,
            failures: Mutex::new(Failures::default()),
            list_delay: Mutex::new(Duration::ZERO),
            gate_enabled: AtomicBool::new(false),
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
            writes: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            deletes: Mutex::new(Vec::new()),
        }
    }

    /// Makes every call of `op` fail with `factory()`; `None` clears it.
    pub fn fail(&self, op: RepoOp, factory: Option<ErrorFactory>) {
        let mut failures = self.failures.lock();
        match op {
            RepoOp::Write => failures.write = factory,
            RepoOp::List => failures.list = factory,
            RepoOp::Delete => failures.delete = factory.map(|f| (None, f)),
        }
    }

    /// Makes deletes of the named record fail with `factory()`.
    pub fn fail_delete_of(&self, name: &str, factory: ErrorFactory) {
        self.failures.lock().delete = Some((Some(name.to_owned()), factory));
    }

    /// Sleeps for `delay` inside every `list` call.
    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock() = delay;
    }

    /// Blocks every subsequent `list` call until [`release_list`](Self::release_list).
    pub fn enable_list_gate(&self) {
        self.gate_enabled.store(true, Ordering::SeqCst);
    }

    /// Resolves once a gated `list` call has started.
    pub async fn list_started(&self) {
        self.started.notified().await;
    }

    /// Releases one gated `list` call.
    pub fn release_list(&self) {
        self.release.notify_one();
    }

    /// Number of `write` calls observed (including failed ones).
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of `list` calls observed (including failed ones).
    #[must_use]
    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Names passed to `delete`, in call order (including failed ones).
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.deletes.lock().clone()
    }
}

#[async_trait]
impl SigningKeyRepository for InstrumentedRepository {
    async fn write(&self, name: &str, key: &[u8]) -> StorageResult<SigningKeyRecord> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(factory) = self.failures.lock().write {
            return Err(factory());
        }
        self.inner.write(name, key).await
    }

    async fn list(&self) -> StorageResult<Vec<SigningKeyRecord>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.gate_enabled.load(Ordering::SeqCst) {
            self.started.notify_one();
            self.release.notified().await;
        }
        let delay = *self.list_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(factory) = self.failures.lock().list {
            return Err(factory());
        }
        self.inner.list().await
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        self.deletes.lock().push(name.to_owned());
        let injected = match &self.failures.lock().delete {
            Some((None, factory)) => Some(factory()),
            Some((Some(target), factory)) if target == name => Some(factory()),
            _ => None,
        };
        if let Some(err) = injected {
            return Err(err);
        }
        self.inner.delete(name).await
    }
}
