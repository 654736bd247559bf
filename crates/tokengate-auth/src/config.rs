//! Session-token and throttling configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum number of random bytes in an opaque token.
pub const MIN_TOKEN_BYTES: usize = 32;

/// Upper bound for `access_token_lifetime`.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 3600);

/// Upper bound for `throttle.window`.
pub const MAX_THROTTLE_WINDOW: Duration = Duration::from_secs(30 * 24 * 3600);

/// Root configuration for the token lifecycle.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// access_token_lifetime = "24h"
/// token_bytes = 32
///
/// [auth.throttle]
/// max_attempts = 5
/// window = "1h"
///
/// [auth.timeouts]
/// store = "2s"
/// cache = "500ms"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of an issued token pair. The refresh token shares it.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Random bytes drawn for each opaque token.
    pub token_bytes: usize,

    /// Attempts made for each blacklist write during revocation.
    pub blacklist_write_attempts: u32,

    /// Failed-login throttling.
    pub throttle: ThrottleConfig,

    /// Per-call backend deadlines.
    pub timeouts: TimeoutConfig,

    /// Password hashing cost.
    pub password_hashing: PasswordHashingConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(24 * 3600),
            token_bytes: MIN_TOKEN_BYTES,
            blacklist_write_attempts: 2,
            throttle: ThrottleConfig::default(),
            timeouts: TimeoutConfig::default(),
            password_hashing: PasswordHashingConfig::default(),
        }
    }
}

/// Failed-login throttling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Failures within the window before logins are refused.
    pub max_attempts: u32,

    /// Lifetime of the failure counter, refreshed on every failure.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(3600),
        }
    }
}

/// Deadlines applied to each store or cache call.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "humantime_serde")]
    pub store: Duration,

    #[serde(with = "humantime_serde")]
    pub cache: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            store: Duration::from_secs(3),
            cache: Duration::from_secs(1),
        }
    }
}

/// Argon2id cost parameters.
///
/// Defaults match `argon2::Params::DEFAULT` (19 MiB, 2 passes, 1 lane).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PasswordHashingConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,

    /// Number of passes.
    pub iterations: u32,

    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for PasswordHashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a lifetime, window or deadline
    /// is zero, if the lifetime or window exceeds its upper bound, if fewer
    /// than 32 token bytes are configured, or if the hashing parameters are
    /// rejected by argon2.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "access_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.access_token_lifetime > MAX_TOKEN_LIFETIME {
            return Err(ConfigError::InvalidValue(format!(
                "access_token_lifetime must be at most {}s",
                MAX_TOKEN_LIFETIME.as_secs()
            )));
        }

        if self.token_bytes < MIN_TOKEN_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "token_bytes must be at least {MIN_TOKEN_BYTES}, got {}",
                self.token_bytes
            )));
        }

        if self.blacklist_write_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "blacklist_write_attempts must be > 0".to_string(),
            ));
        }

        if self.throttle.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "throttle.max_attempts must be > 0".to_string(),
            ));
        }

        if self.throttle.window.is_zero() {
            return Err(ConfigError::InvalidValue(
                "throttle.window must be > 0".to_string(),
            ));
        }

        if self.throttle.window > MAX_THROTTLE_WINDOW {
            return Err(ConfigError::InvalidValue(format!(
                "throttle.window must be at most {}s",
                MAX_THROTTLE_WINDOW.as_secs()
            )));
        }

        if self.timeouts.store.is_zero() || self.timeouts.cache.is_zero() {
            return Err(ConfigError::InvalidValue(
                "timeouts must be > 0".to_string(),
            ));
        }

        self.password_hashing.params()?;

        Ok(())
    }
}

impl PasswordHashingConfig {
    /// Builds argon2 parameters from this configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if argon2 rejects the parameters.
    pub fn params(&self) -> Result<argon2::Params, ConfigError> {
        argon2::Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| ConfigError::InvalidValue(format!("password_hashing: {e}")))
    }
}
