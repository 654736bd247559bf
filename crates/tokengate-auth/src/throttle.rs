//! Failed-login throttling.
//!
//! Each username has a counter in the ephemeral cache under
//! `auth:retry:{username}`. Every failed attempt increments it and pushes
//! its expiry out by the configured window; a successful login deletes it.
//! Once the counter reaches `max_attempts` the username is locked until the
//! counter expires. There is no explicit unlock.
//!
//! The increment is a single atomic cache call, so concurrent failures are
//! never lost. A burst of concurrent attempts may still pass the `peek`
//! check before any of them is counted, so the threshold can be exceeded
//! by the number of in-flight requests.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheResult, EphemeralCache, keys};
use crate::config::ThrottleConfig;

/// Result of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// Failures recorded in the current window, including this one.
    pub count: i64,
    /// `true` once `count` has reached the threshold.
    pub locked: bool,
}

/// Per-username failed-login counter.
#[derive(Clone)]
pub struct LoginThrottle {
    cache: Arc<dyn EphemeralCache>,
    max_attempts: i64,
    window: Duration,
}

impl LoginThrottle {
    #[must_use]
    pub fn new(cache: Arc<dyn EphemeralCache>, config: &ThrottleConfig) -> Self {
        Self {
            cache,
            max_attempts: i64::from(config.max_attempts),
            window: config.window,
        }
    }

    /// Failures allowed before the username is locked.
    #[must_use]
    pub fn max_attempts(&self) -> i64 {
        self.max_attempts
    }

    /// Records a failed attempt and reports whether the username is now locked.
    ///
    /// # Errors
    ///
    /// Returns the cache error if the increment fails.
    pub async fn check_and_record_failure(&self, username: &str) -> CacheResult<FailureOutcome> {
        let count = self
            .cache
            .incr_with_ttl(&keys::retry(username), self.window)
            .await?;
        Ok(FailureOutcome {
            count,
            locked: count >= self.max_attempts,
        })
    }

    /// Clears the counter after a successful login.
    ///
    /// # Errors
    ///
    /// Returns the cache error if the delete fails.
    pub async fn reset(&self, username: &str) -> CacheResult<()> {
        self.cache.delete(&keys::retry(username)).await
    }

    /// Reads the current count without changing it.
    ///
    /// A malformed stored value reads as zero.
    ///
    /// # Errors
    ///
    /// Returns the cache error if the read fails.
    pub async fn peek(&self, username: &str) -> CacheResult<i64> {
        let value = self.cache.get(&keys::retry(username)).await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// Returns `true` if `count` is at or above the threshold.
    #[must_use]
    pub fn is_locked(&self, count: i64) -> bool {
        count >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;

    fn throttle(max_attempts: u32, window: Duration) -> LoginThrottle {
        LoginThrottle::new(
            Arc::new(LocalCache::new()),
            &ThrottleConfig {
                max_attempts,
                window,
            },
        )
    }

    #[tokio::test]
    async fn test_counts_are_monotonic_within_window() {
        let throttle = throttle(5, Duration::from_secs(60));
        let mut last = 0;
        for _ in 0..7 {
            let outcome = throttle.check_and_record_failure("alice").await.unwrap();
            assert!(outcome.count > last);
            last = outcome.count;
        }
        assert_eq!(throttle.peek("alice").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_locks_at_threshold() {
        let throttle = throttle(3, Duration::from_secs(60));
        assert!(!throttle.check_and_record_failure("alice").await.unwrap().locked);
        assert!(!throttle.check_and_record_failure("alice").await.unwrap().locked);
        let third = throttle.check_and_record_failure("alice").await.unwrap();
        assert_eq!(third.count, 3);
        assert!(third.locked);
        assert!(throttle.is_locked(throttle.peek("alice").await.unwrap()));
    }

    #[tokio::test]
    async fn test_reset_clears_counter() {
        let throttle = throttle(3, Duration::from_secs(60));
        throttle.check_and_record_failure("alice").await.unwrap();
        throttle.check_and_record_failure("alice").await.unwrap();
        throttle.reset("alice").await.unwrap();
        assert_eq!(throttle.peek("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_peek_does_not_increment() {
        let throttle = throttle(3, Duration::from_secs(60));
        throttle.check_and_record_failure("alice").await.unwrap();
        for _ in 0..5 {
            assert_eq!(throttle.peek("alice").await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_usernames_are_independent() {
        let throttle = throttle(2, Duration::from_secs(60));
        throttle.check_and_record_failure("alice").await.unwrap();
        throttle.check_and_record_failure("alice").await.unwrap();
        assert_eq!(throttle.peek("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_window_expiry_unlocks() {
        let throttle = throttle(2, Duration::from_millis(150));
        throttle.check_and_record_failure("alice").await.unwrap();
        throttle.check_and_record_failure("alice").await.unwrap();
        assert!(throttle.is_locked(throttle.peek("alice").await.unwrap()));

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(throttle.peek("alice").await.unwrap(), 0);
    }
}
