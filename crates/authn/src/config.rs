//! Authentication and key-rotation configuration.
//!
//! [`AuthConfig`] carries the four tunables the key lifecycle consumes
//! (retention bound, debounce interval, token TTL, renewal delta) plus the
//! identity expected from the rotation automation. Loading it from files or
//! the environment is the host service's job; this type only defines the
//! shape, defaults and validation.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sigil_authn::AuthConfig;
//!
//! let config = AuthConfig::builder()
//!     .max_backups(5)
//!     .token_ttl(Duration::from_secs(8 * 3600))
//!     .renewal_delta(Duration::from_secs(3600))
//!     .allowed_principals(vec!["scheduler@example.iam.gserviceaccount.com".to_owned()])
//!     .build()?;
//! assert_eq!(config.max_backups(), 5);
//! # Ok::<(), sigil_authn::AuthError>(())
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{AuthError, Result},
    rotation::validate_max_backups,
};

/// Default number of retained keys (current key plus backups).
pub const DEFAULT_MAX_BACKUPS: usize = 3;

/// Default debounce interval between effective cache refreshes (1 minute).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Default token lifetime (24 hours).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);

/// Default renewal window before expiry (1 hour).
pub const DEFAULT_RENEWAL_DELTA: Duration = Duration::from_secs(3600);

/// User-Agent sent by the scheduler that triggers rotation.
pub const DEFAULT_AUTOMATION_USER_AGENT: &str = "Google-Cloud-Scheduler";

/// Configuration for key rotation, cache refresh and token lifetimes.
///
/// Every constructor validates: the builder on `build()`, and
/// deserialization before the value is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAuthConfig")]
pub struct AuthConfig {
    /// Number of keys kept after a rotation, newest included.
    pub(crate) max_backups: usize,

    /// Minimum interval between effective cache refreshes.
    #[serde(with = "humantime_serde")]
    pub(crate) refresh_interval: Duration,

    /// Lifetime of issued tokens.
    #[serde(with = "humantime_serde")]
    pub(crate) token_ttl: Duration,

    /// Tokens with less remaining life than this are renewed on use.
    #[serde(with = "humantime_serde")]
    pub(crate) renewal_delta: Duration,

    /// User-Agent the rotation automation must present.
    pub(crate) automation_user_agent: String,

    /// Identity-token subjects allowed to trigger rotation.
    pub(crate) allowed_principals: Vec<String>,
}

/// Unvalidated wire form of [`AuthConfig`].
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAuthConfig {
    #[serde(default = "default_max_backups")]
    max_backups: usize,
    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    refresh_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_token_ttl")]
    token_ttl: Duration,
    #[serde(with = "humantime_serde", default = "default_renewal_delta")]
    renewal_delta: Duration,
    #[serde(default = "default_automation_user_agent")]
    automation_user_agent: String,
    #[serde(default)]
    allowed_principals: Vec<String>,
}

impl TryFrom<RawAuthConfig> for AuthConfig {
    type Error = AuthError;

    fn try_from(raw: RawAuthConfig) -> Result<Self> {
        let config = Self {
            max_backups: raw.max_backups,
            refresh_interval: raw.refresh_interval,
            token_ttl: raw.token_ttl,
            renewal_delta: raw.renewal_delta,
            automation_user_agent: raw.automation_user_agent,
            allowed_principals: raw.allowed_principals,
        };
        config.validate()?;
        Ok(config)
    }
}

fn default_max_backups() -> usize {
    DEFAULT_MAX_BACKUPS
}

fn default_refresh_interval() -> Duration {
    DEFAULT_REFRESH_INTERVAL
}

fn default_token_ttl() -> Duration {
    DEFAULT_TOKEN_TTL
}

fn default_renewal_delta() -> Duration {
    DEFAULT_RENEWAL_DELTA
}

fn default_automation_user_agent() -> String {
    DEFAULT_AUTOMATION_USER_AGENT.to_owned()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_backups: DEFAULT_MAX_BACKUPS,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            token_ttl: DEFAULT_TOKEN_TTL,
            renewal_delta: DEFAULT_RENEWAL_DELTA,
            automation_user_agent: default_automation_user_agent(),
            allowed_principals: Vec::new(),
        }
    }
}

#[bon::bon]
impl AuthConfig {
    /// Creates a new configuration, validating every field.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if:
    /// - `max_backups` is outside `1..=32`
    /// - `refresh_interval` is zero
    /// - `token_ttl` is shorter than one second
    /// - `renewal_delta` is not shorter than `token_ttl`
    /// - `automation_user_agent` is empty
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_BACKUPS)] max_backups: usize,
        #[builder(default = DEFAULT_REFRESH_INTERVAL)] refresh_interval: Duration,
        #[builder(default = DEFAULT_TOKEN_TTL)] token_ttl: Duration,
        #[builder(default = DEFAULT_RENEWAL_DELTA)] renewal_delta: Duration,
        #[builder(into, default = default_automation_user_agent())] automation_user_agent: String,
        #[builder(default)] allowed_principals: Vec<String>,
    ) -> Result<Self> {
        let config = Self {
            max_backups,
            refresh_interval,
            token_ttl,
            renewal_delta,
            automation_user_agent,
            allowed_principals,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every field against its constraint.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn validate(&self) -> Result<()> {
        validate_max_backups(self.max_backups)?;

        if self.refresh_interval.is_zero() {
            return Err(AuthError::validation("refresh_interval must be greater than zero"));
        }
        if self.token_ttl < Duration::from_secs(1) {
            return Err(AuthError::validation("token_ttl must be at least one second"));
        }
        if self.renewal_delta >= self.token_ttl {
            return Err(AuthError::validation(format!(
                "renewal_delta ({:?}) must be shorter than token_ttl ({:?})",
                self.renewal_delta, self.token_ttl
            )));
        }
        if self.automation_user_agent.trim().is_empty() {
            return Err(AuthError::validation("automation_user_agent cannot be empty"));
        }
        Ok(())
    }

    /// Number of keys kept after a rotation.
    #[must_use]
    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    /// Debounce interval for cache refreshes.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Lifetime of issued tokens.
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Remaining-life threshold below which tokens are renewed.
    #[must_use]
    pub fn renewal_delta(&self) -> Duration {
        self.renewal_delta
    }

    /// User-Agent the rotation automation must present.
    #[must_use]
    pub fn automation_user_agent(&self) -> &str {
        &self.automation_user_agent
    }

    /// Identity-token subjects allowed to trigger rotation.
    #[must_use]
    pub fn allowed_principals(&self) -> &[String] {
        &self.allowed_principals
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_backups(), DEFAULT_MAX_BACKUPS);
        assert_eq!(config.automation_user_agent(), DEFAULT_AUTOMATION_USER_AGENT);
    }

    #[test]
    fn test_builder_defaults_match_default_impl() {
        let built = AuthConfig::builder().build().unwrap();
        assert_eq!(built, AuthConfig::default());
    }

    #[rstest]
    #[case::zero_backups(AuthConfig::builder().max_backups(0).build())]
    #[case::too_many_backups(AuthConfig::builder().max_backups(33).build())]
    #[case::zero_interval(AuthConfig::builder().refresh_interval(Duration::ZERO).build())]
    #[case::sub_second_ttl(AuthConfig::builder().token_ttl(Duration::from_millis(500)).build())]
    #[case::delta_not_below_ttl(
        AuthConfig::builder()
            .token_ttl(Duration::from_secs(60))
            .renewal_delta(Duration::from_secs(60))
            .build()
    )]
    #[case::empty_user_agent(AuthConfig::builder().automation_user_agent(" ").build())]
    fn test_builder_rejects_invalid(#[case] result: Result<AuthConfig>) {
        assert!(matches!(result, Err(AuthError::Validation { .. })));
    }

    #[test]
    fn test_deserialization_with_defaults() {
        let json = r#"{ "max_backups": 4, "token_ttl": "12h" }"#;

        let config: AuthConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.max_backups(), 4);
        assert_eq!(config.token_ttl(), Duration::from_secs(12 * 3600));
        assert_eq!(config.refresh_interval(), DEFAULT_REFRESH_INTERVAL);
        assert_eq!(config.renewal_delta(), DEFAULT_RENEWAL_DELTA);
        assert!(config.allowed_principals().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialization_rejects_unknown_fields() {
        let json = r#"{ "max_backups": 4, "backup_bucket": "keys" }"#;
        assert!(serde_json::from_str::<AuthConfig>(json).is_err());
    }

    #[rstest]
    #[case::zero_backups(r#"{ "max_backups": 0 }"#)]
    #[case::too_many_backups(r#"{ "max_backups": 64 }"#)]
    #[case::zero_interval(r#"{ "refresh_interval": "0s" }"#)]
    #[case::sub_second_ttl(r#"{ "token_ttl": "500ms" }"#)]
    #[case::delta_not_below_ttl(r#"{ "token_ttl": "1h", "renewal_delta": "1h" }"#)]
    #[case::empty_user_agent(r#"{ "automation_user_agent": "" }"#)]
    fn test_deserialization_rejects_invalid(#[case] json: &str) {
        let err = serde_json::from_str::<AuthConfig>(json).unwrap_err();
        assert!(err.to_string().contains("Validation error"), "unexpected error: {err}");
    }

    #[test]
    fn test_serialized_config_deserializes_back() {
        let config = AuthConfig::builder()
            .refresh_interval(Duration::from_secs(90))
            .allowed_principals(vec!["svc@example.com".to_owned()])
            .build()
            .unwrap();

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""refresh_interval":"1m 30s""#), "{json}");
        assert_eq!(serde_json::from_str::<AuthConfig>(&json).unwrap(), config);
    }

    proptest! {
        #[test]
        fn max_backups_accepted_iff_in_bounds(n in 0usize..100) {
            let result = AuthConfig::builder().max_backups(n).build();
            prop_assert_eq!(result.is_ok(), (1..=32).contains(&n));
        }
    }
}
