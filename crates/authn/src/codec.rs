//! Compact signed token encoding and verification.
//!
//! Tokens are JWS compact serializations signed with Ed25519 (`alg=EdDSA`).
//! The header `kid` names the signing key so verification can try the
//! matching cached key first; every candidate is still tried, which is what
//! lets tokens signed by a just-superseded key keep verifying.
//!
//! ```json
//! { "alg": "EdDSA", "typ": "JWT", "kid": "key-6f1c..." }
//! { "sub": "user-42", "jti": "b3c1...", "iat": 1767225600, "exp": 1767312000 }
//! ```
//!
//! Timestamps are whole seconds since the epoch: `iat` is `now` truncated
//! and `exp` is `now + ttl` rounded up, so a token is never shorter-lived
//! than its ttl. A token is rejected once `now` is past `exp`. Every decode
//! failure is reported as
//! [`AuthError::InvalidCredentials`]; the reason is logged at DEBUG only.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use chrono::{TimeZone, Utc};
//! use ed25519_dalek::SigningKey;
//! use sigil_authn::{CachedSigningKey, JwtTokenCodec, TokenCodec};
//!
//! let key = CachedSigningKey::from_signing_key(
//!     "key-1".into(),
//!     Utc::now(),
//!     SigningKey::from_bytes(&[7u8; 32]),
//! )?;
//! let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
//!
//! let codec = JwtTokenCodec::new();
//! let token = codec.encode("user-42", Duration::from_secs(3600), Some(&key), "tok-1", now)?;
//! let claims = codec.decode(&token, &[key.public_key().clone()], now)?;
//! assert_eq!(claims.user_id(), "user-42");
//! # Ok::<(), sigil_authn::AuthError>(())
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header, encode};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AuthError, Result},
    key_cache::{CachedSigningKey, PublicKey},
};

/// Token signature algorithms accepted on decode.
///
/// `none` cannot be represented by the header parser and is rejected as
/// malformed; HMAC and RSA variants are rejected here.
pub const ACCEPTED_ALGORITHMS: &[Algorithm] = &[Algorithm::EdDSA];

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenClaims {
    /// User the token was issued to.
    pub sub: String,
    /// Unique token identifier.
    pub jti: String,
    /// Issued at (seconds since epoch).
    pub iat: i64,
    /// Expiration time (seconds since epoch).
    pub exp: i64,
}

impl TokenClaims {
    /// User the token was issued to.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.sub
    }

    /// Unique token identifier.
    #[must_use]
    pub fn token_id(&self) -> &str {
        &self.jti
    }

    /// When the token was issued.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// When the token expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether the token is expired at `now`, i.e. `now` is past its
    /// expiry. A token is still valid at the expiry second itself.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Life left at `now`, zero once expired.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at() - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Signs and verifies claims tokens.
pub trait TokenCodec: Send + Sync {
    /// Issues a token for `user_id` valid from `now` for `ttl`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] if `signing_key` is `None`, `ttl` is shorter than one second,
    ///   or `user_id`/`token_id` is empty
    /// - [`AuthError::Signing`] if signing fails
    fn encode(
        &self,
        user_id: &str,
        ttl: Duration,
        signing_key: Option<&CachedSigningKey>,
        token_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String>;

    /// Verifies `token` against `candidates` and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if the token is empty,
    /// malformed, not EdDSA-signed, verifies against no candidate, or is
    /// expired at `now`.
    fn decode(&self, token: &str, candidates: &[PublicKey], now: DateTime<Utc>)
    -> Result<TokenClaims>;
}

/// [`TokenCodec`] producing EdDSA-signed JWTs.
#[derive(Debug, Clone)]
pub struct JwtTokenCodec {
    validation: Validation,
}

impl Default for JwtTokenCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl JwtTokenCodec {
    /// Creates a codec.
    #[must_use]
    pub fn new() -> Self {
        let mut validation = Validation::new(Algorithm::EdDSA);
        // Expiry is checked against the caller's clock, not the system clock.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        Self { validation }
    }
}

impl TokenCodec for JwtTokenCodec {
    fn encode(
        &self,
        user_id: &str,
        ttl: Duration,
        signing_key: Option<&CachedSigningKey>,
        token_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let signing_key =
            signing_key.ok_or_else(|| AuthError::validation("no signing key available"))?;
        if ttl < Duration::from_secs(1) {
            return Err(AuthError::validation("token ttl must be at least one second"));
        }
        if user_id.is_empty() {
            return Err(AuthError::validation("user id cannot be empty"));
        }
        if token_id.is_empty() {
            return Err(AuthError::validation("token id cannot be empty"));
        }

        // Claims hold whole seconds: expiry rounds up so a token never
        // expires before `now + ttl`.
        let iat = now.timestamp();
        let expires = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| AuthError::validation("token ttl out of range"))?;
        let exp = expires.timestamp() + i64::from(expires.timestamp_subsec_nanos() > 0);
        let claims = TokenClaims { sub: user_id.to_owned(), jti: token_id.to_owned(), iat, exp };

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(signing_key.name().to_owned());

        encode(&header, &claims, signing_key.encoding_key())
            .map_err(|e| AuthError::signing(e.to_string()))
    }

    fn decode(
        &self,
        token: &str,
        candidates: &[PublicKey],
        now: DateTime<Utc>,
    ) -> Result<TokenClaims> {
        if token.is_empty() {
            return Err(reject("empty token"));
        }

        let header = decode_header(token).map_err(|_| reject("malformed header"))?;
        if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
            return Err(reject("unsupported algorithm"));
        }

        let kid = header.kid.as_deref();
        let ordered = candidates
            .iter()
            .filter(|key| Some(key.name()) == kid)
            .chain(candidates.iter().filter(|key| Some(key.name()) != kid));

        let claims = ordered
            .filter_map(|key| decode::<TokenClaims>(token, key.decoding_key(), &self.validation).ok())
            .map(|data| data.claims)
            .next()
            .ok_or_else(|| reject("no candidate key verified the signature"))?;

        if claims.exp <= claims.iat {
            return Err(reject("expiry not after issue time"));
        }
        if claims.is_expired_at(now) {
            return Err(reject("token expired"));
        }

        Ok(claims)
    }
}

fn reject(reason: &'static str) -> AuthError {
    tracing::debug!(reason, "token rejected");
    AuthError::invalid_credentials()
}
