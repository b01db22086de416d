//! Signing-key rotation with bounded backup retention.
//!
//! [`KeyRotationService::refresh`] writes a new key and prunes every record
//! past the retention bound:
//!
//! ```text
//!  max_backups = 2
//!
//!  before     [ A | B | C ]          newest first
//!  write D    [ D | A | B | C ]
//!  prune      [ D | A ] ✗B ✗C
//! ```
//!
//! # Consistency
//!
//! Write, list and prune are separate repository calls. A failure after the
//! write leaves the new key durable and the store temporarily over budget;
//! the next successful rotation prunes the excess. Nothing is rolled back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fail::fail_point;
use sigil_storage::{SigningKeyRepository, StorageError};
use tokio_util::sync::CancellationToken;

use crate::{
    cancellation::cancellable,
    error::{AuthError, Result},
};

/// Smallest accepted retention bound.
pub const MIN_BACKUPS: usize = 1;

/// Largest accepted retention bound.
pub const MAX_BACKUPS: usize = 32;

/// Checks a retention bound against `MIN_BACKUPS..=MAX_BACKUPS`.
///
/// # Errors
///
/// Returns [`AuthError::Validation`] if `max_backups` is out of bounds.
pub fn validate_max_backups(max_backups: usize) -> Result<()> {
    if !(MIN_BACKUPS..=MAX_BACKUPS).contains(&max_backups) {
        return Err(AuthError::validation(format!(
            "max_backups must be within {MIN_BACKUPS}..={MAX_BACKUPS}, got {max_backups}"
        )));
    }
    Ok(())
}

/// Result of a successful rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    /// Name of the newly written key.
    pub name: String,
    /// Creation timestamp stamped by the repository.
    pub created_at: DateTime<Utc>,
    /// Names of the records deleted during pruning, oldest last.
    pub pruned: Vec<String>,
}

/// Writes new signing keys and prunes retained backups.
///
/// Holds no mutable state; concurrent rotations are serialized only by the
/// repository.
#[derive(Clone)]
pub struct KeyRotationService {
    repository: Arc<dyn SigningKeyRepository>,
}

impl std::fmt::Debug for KeyRotationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRotationService").finish_non_exhaustive()
    }
}

impl KeyRotationService {
    /// Creates a rotation service over `repository`.
    #[must_use]
    pub fn new(repository: Arc<dyn SigningKeyRepository>) -> Self {
        Self { repository }
    }

    /// Writes `key` under `name`, then deletes every record past the
    /// `max_backups`-th newest.
    ///
    /// Deletions run one at a time, oldest-excess order as listed, and stop
    /// at the first failure. The just-written key is never deleted.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] if `key` or `name` is empty or `max_backups` is out of bounds;
    ///   the repository is not touched
    /// - [`AuthError::KeyStorage`] if the write, list or a delete fails, or the context is
    ///   cancelled before the write starts
    #[tracing::instrument(skip(self, cancel, key))]
    pub async fn refresh(
        &self,
        cancel: &CancellationToken,
        key: &[u8],
        name: &str,
        max_backups: usize,
    ) -> Result<RotationOutcome> {
        validate_max_backups(max_backups)?;
        if key.is_empty() {
            return Err(AuthError::validation("signing key cannot be empty"));
        }
        if name.is_empty() {
            return Err(AuthError::validation("signing key name cannot be empty"));
        }

        // A write is either not started or awaited to completion.
        if cancel.is_cancelled() {
            return Err(AuthError::key_storage("write", StorageError::cancelled("write")));
        }
        let record = self
            .repository
            .write(name, key)
            .await
            .map_err(|e| AuthError::key_storage("write", e))?;

        tracing::info!(
            audit.action = "rotate_signing_key",
            audit.resource = %name,
            audit.result = "success",
            "audit_event"
        );

        fail_point!("rotation-after-write", |_| {
            Err(AuthError::key_storage(
                "list",
                StorageError::internal("injected failure after key write"),
            ))
        });

        let records = cancellable(cancel, "list", self.repository.list())
            .await
            .map_err(|e| AuthError::key_storage("list", e))?;

        let mut pruned = Vec::new();
        for stale in records.iter().skip(max_backups) {
            if stale.name == name {
                tracing::warn!(
                    key = %name,
                    "repository listed the new key past the retention bound; not deleting it"
                );
                continue;
            }

            if let Err(e) = cancellable(cancel, "delete", self.repository.delete(&stale.name)).await {
                tracing::warn!(
                    audit.action = "prune_signing_key",
                    audit.resource = %stale.name,
                    audit.result = "failure",
                    error = %e,
                    "audit_event"
                );
                return Err(AuthError::key_storage("delete", e));
            }

            tracing::info!(
                audit.action = "prune_signing_key",
                audit.resource = %stale.name,
                audit.result = "success",
                "audit_event"
            );
            pruned.push(stale.name.clone());
        }

        tracing::debug!(retained = records.len() - pruned.len(), pruned = pruned.len(), "rotation complete");

        Ok(RotationOutcome { name: record.name, created_at: record.created_at, pruned })
    }
}
