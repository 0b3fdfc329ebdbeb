//! Access control configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root access control configuration, embedded as `[auth]`.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// default_password = "welcome1"
/// token_ttl = "12h"
/// blacklist_ttl = "30m"
///
/// [auth.rate_limit]
/// capacity = 5
/// refill_window = "15m"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Password given to logins created on first use, until an
    /// administrator resets all passwords to something else.
    pub default_password: String,

    /// Shortest accepted password.
    pub min_password_length: usize,

    /// Lifetime of an issued token. Zero disables expiry.
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,

    /// How long a login name stays blacklisted. Unset means until
    /// unblocked by hand.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub blacklist_ttl: Option<Duration>,

    /// Failed-login throttling.
    pub rate_limit: RateLimitConfig,

    /// Argon2id cost parameters for new hashes.
    pub hashing: HashingConfig,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            default_password: "12345678".to_string(),
            min_password_length: 6,
            token_ttl: Duration::from_secs(24 * 60 * 60),
            blacklist_ttl: None,
            rate_limit: RateLimitConfig::default(),
            hashing: HashingConfig::default(),
        }
    }
}

/// Per-login token bucket for failed attempts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Failed attempts allowed before the login name is blacklisted.
    pub capacity: u32,

    /// Time for an empty bucket to refill completely.
    #[serde(with = "humantime_serde")]
    pub refill_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_window: Duration::from_secs(60 * 60),
        }
    }
}

/// Argon2id parameters. Existing hashes carry their own parameters, so
/// changing these only affects hashes produced afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl AccessConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `min_password_length` is zero
    /// - `default_password` is shorter than `min_password_length`
    /// - the rate limit capacity or refill window is zero
    /// - the Argon2 parameters are rejected by `argon2`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_password_length == 0 {
            return Err(ConfigError::InvalidValue(
                "min_password_length must be > 0".to_string(),
            ));
        }

        if self.default_password.chars().count() < self.min_password_length {
            return Err(ConfigError::InvalidValue(format!(
                "default_password must be at least {} characters",
                self.min_password_length
            )));
        }

        if self.rate_limit.capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limit.capacity must be > 0".to_string(),
            ));
        }

        if self.rate_limit.refill_window.is_zero() {
            return Err(ConfigError::InvalidValue(
                "rate_limit.refill_window must be > 0".to_string(),
            ));
        }

        argon2::Params::new(
            self.hashing.memory_kib,
            self.hashing.iterations,
            self.hashing.parallelism,
            None,
        )
        .map_err(|e| ConfigError::InvalidValue(format!("hashing: {e}")))?;

        Ok(())
    }

    /// A cheap hashing profile with short limits, for tests.
    pub fn for_tests() -> Self {
        Self {
            hashing: HashingConfig {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AccessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_password_length, 6);
        assert_eq!(config.rate_limit.capacity, 10);
        assert_eq!(config.token_ttl, Duration::from_secs(86_400));
        assert!(config.blacklist_ttl.is_none());
    }

    #[test]
    fn test_short_default_password_rejected() {
        let config = AccessConfig {
            default_password: "123".into(),
            ..AccessConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_humantime_fields() {
        let config: AccessConfig = serde_json::from_value(serde_json::json!({
            "token_ttl": "0s",
            "blacklist_ttl": "30m",
            "rate_limit": { "refill_window": "15m" }
        }))
        .unwrap();
        assert!(config.token_ttl.is_zero());
        assert_eq!(config.blacklist_ttl, Some(Duration::from_secs(1800)));
        assert_eq!(config.rate_limit.refill_window, Duration::from_secs(900));
        assert_eq!(config.rate_limit.capacity, 10);
    }

    #[test]
    fn test_bad_hashing_params_rejected() {
        let mut config = AccessConfig::default();
        config.hashing.iterations = 0;
        assert!(config.validate().is_err());
    }
}
