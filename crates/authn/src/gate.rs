//! Token authentication with sliding-expiration renewal.
//!
//! [`AuthenticationGate`] is what request handlers call. It verifies tokens
//! against every cached public key and, when asked, renews tokens that are
//! close to expiry so an active session never lapses:
//!
//! ```text
//!  iat                                  exp - renewal_delta        exp
//!   ├─────────────── no renewal ─────────────────┼──── renew ─────┤ ✗
//! ```
//!
//! A renewal that fails is a soft failure: the original token stays valid
//! and is returned together with the error.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::{
    codec::{JwtTokenCodec, TokenClaims, TokenCodec},
    config::AuthConfig,
    error::{AuthError, Result},
    key_cache::KeyCache,
};

/// Username and password presented at login.
#[derive(Clone)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Plain-text password, scrubbed on drop.
    pub password: Zeroizing<String>,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: Zeroizing::new(password.into()) }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Checks login credentials against the user store.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Returns the user id for valid credentials, `None` for invalid ones.
    ///
    /// # Errors
    ///
    /// Returns an error only if the check itself could not be performed.
    async fn verify(&self, credentials: &Credentials) -> Result<Option<String>>;
}

/// A successfully authenticated request.
#[derive(Debug)]
pub struct Authenticated {
    /// Claims of [`token`](Self::token).
    pub claims: TokenClaims,
    /// The token the caller should use from now on.
    pub token: String,
    /// Whether `token` is a renewal of the presented token.
    pub renewed: bool,
    /// Why a due renewal failed. `token` is then the presented token.
    pub renewal_error: Option<AuthError>,
}

/// A token issued at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Claims of the token.
    pub claims: TokenClaims,
    /// The signed token.
    pub token: String,
}

/// Verifies, renews and issues tokens using the shared [`KeyCache`].
pub struct AuthenticationGate {
    cache: Arc<KeyCache>,
    codec: Arc<dyn TokenCodec>,
    credential_verifier: Arc<dyn CredentialVerifier>,
    token_ttl: Duration,
    renewal_delta: Duration,
}

impl std::fmt::Debug for AuthenticationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationGate")
            .field("token_ttl", &self.token_ttl)
            .field("renewal_delta", &self.renewal_delta)
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl AuthenticationGate {
    /// Creates a gate. The codec defaults to [`JwtTokenCodec`].
    #[builder]
    pub fn new(
        cache: Arc<KeyCache>,
        credential_verifier: Arc<dyn CredentialVerifier>,
        config: &AuthConfig,
        #[builder(default = Arc::new(JwtTokenCodec::new()) as Arc<dyn TokenCodec>)]
        codec: Arc<dyn TokenCodec>,
    ) -> Self {
        Self {
            cache,
            codec,
            credential_verifier,
            token_ttl: config.token_ttl(),
            renewal_delta: config.renewal_delta(),
        }
    }

    /// Verifies `token` against every cached public key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for any failure, including
    /// an empty token.
    #[tracing::instrument(skip_all)]
    pub fn force_authentication(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims> {
        if token.is_empty() {
            return Err(AuthError::invalid_credentials());
        }

        self.codec.decode(token, &self.cache.list_public(), now).map_err(|e| {
            if !matches!(e, AuthError::InvalidCredentials) {
                tracing::debug!(error = %e, "token decode failed");
            }
            AuthError::invalid_credentials()
        })
    }

    /// Verifies `token` and, with `auto_renew`, renews it when less than
    /// `renewal_delta` of its life remains.
    ///
    /// The renewed token carries the same user, a fresh token id and a full
    /// `token_ttl`, and is signed with the newest cached key. If renewal
    /// fails the presented token is returned with
    /// [`renewal_error`](Authenticated::renewal_error) set.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if the token does not
    /// verify.
    #[tracing::instrument(skip(self, token))]
    pub fn authenticate(
        &self,
        token: &str,
        auto_renew: bool,
        now: DateTime<Utc>,
    ) -> Result<Authenticated> {
        let claims = self.force_authentication(token, now)?;

        let unchanged = |claims, renewal_error| Authenticated {
            claims,
            token: token.to_owned(),
            renewed: false,
            renewal_error,
        };

        if !auto_renew || claims.remaining_at(now) >= self.renewal_delta {
            return Ok(unchanged(claims, None));
        }

        match self.issue(claims.user_id(), now) {
            Ok(issued) => {
                tracing::debug!(user_id = %claims.user_id(), "token renewed");
                Ok(Authenticated {
                    claims: issued.claims,
                    token: issued.token,
                    renewed: true,
                    renewal_error: None,
                })
            },
            Err(e) => {
                tracing::warn!(user_id = %claims.user_id(), error = %e, "token renewal failed; keeping current token");
                Ok(unchanged(claims, Some(e)))
            },
        }
    }

    /// Verifies `credentials` and issues a fresh token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredentials`] if the credentials are rejected
    /// - [`AuthError::Validation`] if no signing key is cached
    /// - any error from the [`CredentialVerifier`]
    #[tracing::instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials, now: DateTime<Utc>) -> Result<IssuedToken> {
        let Some(user_id) = self.credential_verifier.verify(credentials).await? else {
            tracing::info!(
                audit.action = "login",
                audit.resource = %credentials.username,
                audit.result = "failure",
                "audit_event"
            );
            return Err(AuthError::invalid_credentials());
        };

        let issued = self.issue(&user_id, now)?;
        tracing::info!(
            audit.action = "login",
            audit.resource = %credentials.username,
            audit.result = "success",
            "audit_event"
        );
        Ok(issued)
    }

    fn issue(&self, user_id: &str, now: DateTime<Utc>) -> Result<IssuedToken> {
        let signing_key = self.cache.get_private();
        let token_id = uuid::Uuid::new_v4().to_string();
        let token =
            self.codec.encode(user_id, self.token_ttl, signing_key.as_deref(), &token_id, now)?;

        let issuer: Vec<_> = signing_key.iter().map(|key| key.public_key().clone()).collect();
        let claims = self
            .codec
            .decode(&token, &issuer, now)
            .map_err(|_| AuthError::signing("issued token does not verify with its signing key"))?;
        Ok(IssuedToken { claims, token })
    }
}
