//! Configuration for inbound verification and outbound signing.
//!
//! [`AuthConfig`] identifies the local app (its slug doubles as the expected
//! token audience and as the `App=` value of outbound calls) and carries the
//! time windows the verifiers enforce. It deserializes from any `serde`
//! format with human-readable durations (`"2m"`, `"300s"`).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::validate_app_slug;

/// Default clock-skew tolerance for signature timestamps (±2 minutes).
pub const DEFAULT_SIGNATURE_TOLERANCE: Duration = Duration::from_secs(120);

/// Default lifetime of issued bearer tokens (2 minutes).
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(120);

/// Default TTL of the app key cache (5 minutes).
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_secs(300);

/// Upper bound on the signature tolerance.
pub const MAX_SIGNATURE_TOLERANCE: Duration = Duration::from_secs(60 * 60);

/// Upper bound on the lifetime of issued bearer tokens.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on the TTL of the app key cache.
pub const MAX_KEY_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default maximum number of apps held by the key cache.
pub const DEFAULT_KEY_CACHE_CAPACITY: u64 = 10_000;

/// Default maximum number of nonces tracked by the replay detector.
pub const DEFAULT_REPLAY_CAPACITY: u64 = 10_000;

/// Invalid configuration.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A field holds a value outside its allowed range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Authentication settings for one app.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use academy_common_authn::AuthConfig;
///
/// let config = AuthConfig::builder()
///     .app_slug("academy")
///     .issuer("https://api.academy.example")
///     .signature_tolerance(Duration::from_secs(60))
///     .build()?;
///
/// assert_eq!(config.app_slug(), "academy");
/// assert_eq!(config.token_lifetime(), Duration::from_secs(120));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Slug of the local app.
    pub(crate) app_slug: String,

    /// `iss` claim of issued tokens.
    pub(crate) issuer: String,

    /// Accepted clock skew for signature timestamps, in both directions.
    #[serde(with = "humantime_serde", default = "default_signature_tolerance")]
    pub(crate) signature_tolerance: Duration,

    /// Lifetime of issued bearer tokens.
    #[serde(with = "humantime_serde", default = "default_token_lifetime")]
    pub(crate) token_lifetime: Duration,

    /// TTL of cached app keys.
    #[serde(with = "humantime_serde", default = "default_key_cache_ttl")]
    pub(crate) key_cache_ttl: Duration,

    /// Capacity of the app key cache.
    #[serde(default = "default_key_cache_capacity")]
    pub(crate) key_cache_capacity: u64,

    /// Capacity of the replay detector.
    #[serde(default = "default_replay_capacity")]
    pub(crate) replay_capacity: u64,
}

fn default_signature_tolerance() -> Duration {
    DEFAULT_SIGNATURE_TOLERANCE
}

fn default_token_lifetime() -> Duration {
    DEFAULT_TOKEN_LIFETIME
}

fn default_key_cache_ttl() -> Duration {
    DEFAULT_KEY_CACHE_TTL
}

fn default_key_cache_capacity() -> u64 {
    DEFAULT_KEY_CACHE_CAPACITY
}

fn default_replay_capacity() -> u64 {
    DEFAULT_REPLAY_CAPACITY
}

fn check_duration(field: &'static str, value: Duration, max: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue { field, reason: "must be greater than zero".into() });
    }
    if value > max {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("must not exceed {}s", max.as_secs()),
        });
    }
    Ok(())
}

#[bon::bon]
impl AuthConfig {
    /// Creates a new configuration, validating every field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if:
    /// - `app_slug` is not a valid slug
    /// - `issuer` is empty
    /// - a duration is zero or above its `MAX_*` bound
    /// - a capacity is zero
    #[builder]
    pub fn new(
        #[builder(into)] app_slug: String,
        #[builder(into)] issuer: String,
        #[builder(default = DEFAULT_SIGNATURE_TOLERANCE)] signature_tolerance: Duration,
        #[builder(default = DEFAULT_TOKEN_LIFETIME)] token_lifetime: Duration,
        #[builder(default = DEFAULT_KEY_CACHE_TTL)] key_cache_ttl: Duration,
        #[builder(default = DEFAULT_KEY_CACHE_CAPACITY)] key_cache_capacity: u64,
        #[builder(default = DEFAULT_REPLAY_CAPACITY)] replay_capacity: u64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            app_slug,
            issuer,
            signature_tolerance,
            token_lifetime,
            key_cache_ttl,
            key_cache_capacity,
            replay_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// Re-checks invariants, e.g. after deserialization.
    ///
    /// # Errors
    ///
    /// See [`AuthConfig::builder`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(err) = validate_app_slug(&self.app_slug) {
            return Err(ConfigError::InvalidValue { field: "app_slug", reason: err.to_string() });
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "issuer",
                reason: "must not be empty".into(),
            });
        }
        check_duration("signature_tolerance", self.signature_tolerance, MAX_SIGNATURE_TOLERANCE)?;
        check_duration("token_lifetime", self.token_lifetime, MAX_TOKEN_LIFETIME)?;
        check_duration("key_cache_ttl", self.key_cache_ttl, MAX_KEY_CACHE_TTL)?;
        if self.key_cache_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "key_cache_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        if self.replay_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "replay_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Slug of the local app.
    #[must_use]
    pub fn app_slug(&self) -> &str {
        &self.app_slug
    }

    /// `iss` claim of issued tokens.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Accepted clock skew for signature timestamps.
    #[must_use]
    pub fn signature_tolerance(&self) -> Duration {
        self.signature_tolerance
    }

    /// Lifetime of issued bearer tokens.
    #[must_use]
    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    /// TTL of cached app keys.
    #[must_use]
    pub fn key_cache_ttl(&self) -> Duration {
        self.key_cache_ttl
    }

    /// Capacity of the app key cache.
    #[must_use]
    pub fn key_cache_capacity(&self) -> u64 {
        self.key_cache_capacity
    }

    /// Capacity of the replay detector.
    #[must_use]
    pub fn replay_capacity(&self) -> u64 {
        self.replay_capacity
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = AuthConfig::builder().app_slug("academy").issuer("https://api").build().unwrap();
        assert_eq!(config.signature_tolerance(), DEFAULT_SIGNATURE_TOLERANCE);
        assert_eq!(config.token_lifetime(), DEFAULT_TOKEN_LIFETIME);
        assert_eq!(config.key_cache_ttl(), DEFAULT_KEY_CACHE_TTL);
        assert_eq!(config.key_cache_capacity(), DEFAULT_KEY_CACHE_CAPACITY);
        assert_eq!(config.replay_capacity(), DEFAULT_REPLAY_CAPACITY);
    }

    #[test]
    fn test_builder_rejects_bad_slug() {
        let result = AuthConfig::builder().app_slug("has space").issuer("https://api").build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { field: "app_slug", .. })));
    }

    #[test]
    fn test_builder_rejects_empty_issuer() {
        let result = AuthConfig::builder().app_slug("academy").issuer("  ").build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { field: "issuer", .. })));
    }

    #[test]
    fn test_builder_rejects_zero_tolerance() {
        let result = AuthConfig::builder()
            .app_slug("academy")
            .issuer("https://api")
            .signature_tolerance(Duration::ZERO)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "signature_tolerance", .. })
        ));
    }

    #[rstest]
    #[case::tolerance_at_max(MAX_SIGNATURE_TOLERANCE, DEFAULT_TOKEN_LIFETIME, DEFAULT_KEY_CACHE_TTL, None)]
    #[case::tolerance_over_max(
        MAX_SIGNATURE_TOLERANCE + Duration::from_secs(1),
        DEFAULT_TOKEN_LIFETIME,
        DEFAULT_KEY_CACHE_TTL,
        Some("signature_tolerance")
    )]
    #[case::tolerance_huge(Duration::MAX, DEFAULT_TOKEN_LIFETIME, DEFAULT_KEY_CACHE_TTL, Some("signature_tolerance"))]
    #[case::lifetime_huge(DEFAULT_SIGNATURE_TOLERANCE, Duration::MAX, DEFAULT_KEY_CACHE_TTL, Some("token_lifetime"))]
    #[case::lifetime_zero(DEFAULT_SIGNATURE_TOLERANCE, Duration::ZERO, DEFAULT_KEY_CACHE_TTL, Some("token_lifetime"))]
    #[case::cache_ttl_huge(DEFAULT_SIGNATURE_TOLERANCE, DEFAULT_TOKEN_LIFETIME, Duration::MAX, Some("key_cache_ttl"))]
    fn test_duration_bounds(
        #[case] signature_tolerance: Duration,
        #[case] token_lifetime: Duration,
        #[case] key_cache_ttl: Duration,
        #[case] rejected_field: Option<&str>,
    ) {
        let result = AuthConfig::builder()
            .app_slug("academy")
            .issuer("https://api")
            .signature_tolerance(signature_tolerance)
            .token_lifetime(token_lifetime)
            .key_cache_ttl(key_cache_ttl)
            .build();
        match rejected_field {
            None => assert!(result.is_ok()),
            Some(expected) => {
                assert!(matches!(result, Err(ConfigError::InvalidValue { field, .. }) if field == expected));
            },
        }
    }

    #[test]
    fn test_deserialized_config_revalidated() {
        let config: AuthConfig = serde_json::from_str(
            r#"{"app_slug":"academy","issuer":"https://api","signature_tolerance":"3h"}"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "signature_tolerance", .. })
        ));
    }

    #[test]
    fn test_deserialize_humantime() {
        let config: AuthConfig = serde_json::from_str(
            r#"{"app_slug":"academy","issuer":"https://api","signature_tolerance":"90s","token_lifetime":"5m"}"#,
        )
        .unwrap();
        assert_eq!(config.signature_tolerance(), Duration::from_secs(90));
        assert_eq!(config.token_lifetime(), Duration::from_secs(300));
        assert_eq!(config.key_cache_ttl(), DEFAULT_KEY_CACHE_TTL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let result: Result<AuthConfig, _> =
            serde_json::from_str(r#"{"app_slug":"academy","issuer":"x","bogus":1}"#);
        assert!(result.is_err());
    }
}
