//! Caller authorization for rotation triggers.
//!
//! Rotation is triggered by a scheduler calling an internal endpoint. The
//! caller must present the expected automation User-Agent and an
//! `Authorization: Bearer <identity-token>` header whose token verifies to
//! an allow-listed subject:
//!
//! ```text
//!  User-Agent == expected ──► Bearer token ──► IdentityTokenVerifier
//!                                                   │ subject
//!                                                   ▼
//!                                          subject ∈ allowed_principals
//! ```
//!
//! Verifying the identity token itself (issuer keys, audience) is the job
//! of the injected [`IdentityTokenVerifier`].

use async_trait::async_trait;

use crate::error::{AuthError, Result};

/// Identity established by a verified identity token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Token subject, typically a service-account email.
    pub subject: String,
}

/// Verifies identity tokens presented by backend callers.
#[async_trait]
pub trait IdentityTokenVerifier: Send + Sync {
    /// Verifies `token` and returns the identity it asserts.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not valid. Any error is treated as a
    /// rejection.
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity>;
}

/// Credentials presented by a caller asking for key rotation.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct BackendServiceAuth {
    /// Caller's `User-Agent` header value.
    #[builder(into)]
    pub user_agent: String,
    /// Caller's `Authorization` header value.
    #[builder(into)]
    pub authorization: String,
    /// Subjects allowed to trigger rotation.
    #[builder(default)]
    pub allowed_principals: Vec<String>,
}

impl BackendServiceAuth {
    /// Checks the caller against the expected automation identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthorized`] if the User-Agent does not match,
    /// the `Authorization` value is not a bearer token, the identity token
    /// does not verify, or its subject is not allow-listed.
    #[tracing::instrument(skip(self, verifier), fields(user_agent = %self.user_agent))]
    pub async fn authorize(
        &self,
        expected_user_agent: &str,
        verifier: &dyn IdentityTokenVerifier,
    ) -> Result<VerifiedIdentity> {
        if self.user_agent != expected_user_agent {
            return Err(AuthError::unauthorized("unexpected user agent"));
        }

        let token = bearer_token(&self.authorization)
            .ok_or_else(|| AuthError::unauthorized("missing bearer token"))?;

        let identity = verifier.verify(token).await.map_err(|e| {
            tracing::debug!(error = %e, "identity token rejected");
            AuthError::unauthorized("identity token rejected")
        })?;

        if !self.allowed_principals.iter().any(|principal| *principal == identity.subject) {
            return Err(AuthError::unauthorized(format!(
                "principal '{}' is not allowed to rotate keys",
                identity.subject
            )));
        }

        Ok(identity)
    }
}

/// Extracts the token from a `Bearer <token>` header value.
///
/// The scheme is matched case-insensitively; an empty token is rejected.
#[must_use]
pub fn bearer_token(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
