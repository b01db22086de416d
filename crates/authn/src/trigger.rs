//! Rotation trigger endpoint logic.
//!
//! The HTTP layer routes the rotation POST here with the raw `User-Agent`
//! and `Authorization` header values and maps [`TriggerStatus`] onto the
//! response. Only the status leaves this module; failure detail is logged.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    backend_auth::BackendServiceAuth, config::AuthConfig, coordinator::CacheRefreshCoordinator,
};

/// Outcome of a rotation trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStatus {
    /// Rotation succeeded (`204 No Content`).
    NoContent,
    /// Rotation was rejected or failed (`500 Internal Server Error`).
    InternalError,
}

impl TriggerStatus {
    /// The HTTP status code for this outcome.
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            Self::NoContent => 204,
            Self::InternalError => 500,
        }
    }
}

/// Handles rotation requests from the scheduler.
#[derive(Debug)]
pub struct RotationTrigger {
    coordinator: Arc<CacheRefreshCoordinator>,
    allowed_principals: Vec<String>,
}

impl RotationTrigger {
    /// Creates a trigger that accepts the principals in `config`.
    #[must_use]
    pub fn new(coordinator: Arc<CacheRefreshCoordinator>, config: &AuthConfig) -> Self {
        Self { coordinator, allowed_principals: config.allowed_principals().to_vec() }
    }

    /// Authorizes the caller and rotates the signing key.
    ///
    /// Missing headers are treated as empty values and fail authorization.
    #[tracing::instrument(skip_all)]
    pub async fn handle(
        &self,
        user_agent: Option<&str>,
        authorization: Option<&str>,
        cancel: &CancellationToken,
    ) -> TriggerStatus {
        let auth = BackendServiceAuth::builder()
            .user_agent(user_agent.unwrap_or_default())
            .authorization(authorization.unwrap_or_default())
            .allowed_principals(self.allowed_principals.clone())
            .build();

        match self.coordinator.rotate_jwks(Some(&auth), cancel).await {
            Ok(outcome) => {
                tracing::info!(key = %outcome.name, pruned = outcome.pruned.len(), "signing key rotated");
                TriggerStatus::NoContent
            },
            Err(e) => {
                tracing::error!(error = %e, "signing key rotation failed");
                TriggerStatus::InternalError
            },
        }
    }
}
