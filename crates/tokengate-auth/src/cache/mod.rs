//! Ephemeral key/value cache with per-key TTL.
//!
//! The cache holds three kinds of entries:
//!
//! | Key | Value | Lifetime |
//! |-----|-------|----------|
//! | `auth:token:{access_token}` | principal id | remaining token lifetime |
//! | `auth:blacklist:{token}` | `"1"` | remaining token lifetime |
//! | `auth:retry:{username}` | failure count | throttle window |
//!
//! Token projections are hints; the durable store is authoritative. Blacklist
//! entries are the only record of revocation and must be honoured.
//!
//! # Implementations
//!
//! - [`local::LocalCache`] - single-instance DashMap cache
//! - `tokengate-server` - Redis cache shared across instances

pub mod local;

use std::time::Duration;

use async_trait::async_trait;

pub use local::LocalCache;

/// Key helpers for the cache namespaces.
pub mod keys {
    pub const TOKEN_PREFIX: &str = "auth:token:";
    pub const BLACKLIST_PREFIX: &str = "auth:blacklist:";
    pub const RETRY_PREFIX: &str = "auth:retry:";

    /// Projection from access token to principal id.
    #[must_use]
    pub fn token(access_token: &str) -> String {
        format!("{TOKEN_PREFIX}{access_token}")
    }

    /// Revocation marker for an access or refresh token.
    #[must_use]
    pub fn blacklist(token: &str) -> String {
        format!("{BLACKLIST_PREFIX}{token}")
    }

    /// Failed-login counter for a username.
    #[must_use]
    pub fn retry(username: &str) -> String {
        format!("{RETRY_PREFIX}{username}")
    }
}

/// Errors reported by an [`EphemeralCache`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The cache could not be reached or rejected the command.
    #[error("Cache unavailable: {message}")]
    Unavailable {
        message: String,
    },

    /// The call exceeded its deadline.
    #[error("Cache timeout: {operation}")]
    Timeout {
        operation: String,
    },
}

impl CacheError {
    /// Create an `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a `Timeout` error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Key/value cache with per-key expiry.
#[async_trait]
pub trait EphemeralCache: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value and TTL.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Reads a live value.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Removes a key. Missing keys are not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Atomically increments an integer counter and (re)sets its TTL.
    ///
    /// A missing or expired key starts from zero. Returns the new value.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<i64>;

    /// Returns `true` if a live value exists under `key`.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Backend name for logs.
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn test_key_namespaces() {
        assert_eq!(keys::token("abc"), "auth:token:abc");
        assert_eq!(keys::blacklist("abc"), "auth:blacklist:abc");
        assert_eq!(keys::retry("alice"), "auth:retry:alice");
    }
}
