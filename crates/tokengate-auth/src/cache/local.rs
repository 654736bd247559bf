//! Single-instance cache backed by DashMap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{CacheError, CacheResult, EphemeralCache};

#[derive(Debug, Clone)]
struct CachedValue {
    value: String,
    expires_at: Instant,
}

impl CachedValue {
    fn new(value: String, ttl: Duration) -> CacheResult<Self> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::unavailable(format!("ttl {ttl:?} is out of range")))?;
        Ok(Self { value, expires_at })
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process [`EphemeralCache`].
///
/// Expired entries are dropped lazily on access and by [`purge_expired`].
/// Counters are incremented under the DashMap shard lock, so concurrent
/// increments never lose updates.
///
/// [`purge_expired`]: LocalCache::purge_expired
#[derive(Debug, Clone, Default)]
pub struct LocalCache {
    entries: Arc<DashMap<String, CachedValue>>,
    unavailable: Arc<AtomicBool>,
}

impl LocalCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including not yet purged expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops all expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, v| !v.is_expired());
        before.saturating_sub(self.entries.len())
    }

    /// Makes every call fail with `CacheError::Unavailable` while set.
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(CacheError::unavailable("local cache marked unavailable"));
        }
        Ok(())
    }

    fn live(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove_if(key, |_, v| v.is_expired());
            return None;
        }
        Some(entry.value.clone())
    }
}

#[async_trait]
impl EphemeralCache for LocalCache {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.check()?;
        let cached = CachedValue::new(value.to_string(), ttl)?;
        self.entries.insert(key.to_string(), cached);
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        Ok(self.live(key))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        self.check()?;
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                let current = if slot.get().is_expired() {
                    0
                } else {
                    slot.get().value.parse::<i64>().map_err(|_| {
                        CacheError::unavailable(format!("value at '{key}' is not an integer"))
                    })?
                };
                let next = current + 1;
                slot.insert(CachedValue::new(next.to_string(), ttl)?);
                Ok(next)
            }
            Entry::Vacant(slot) => {
                slot.insert(CachedValue::new("1".to_string(), ttl)?);
                Ok(1)
            }
        }
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        Ok(self.live(key).is_some())
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = LocalCache::new();
        cache
            .set_with_ttl("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        assert!(cache.exists("k").await.unwrap());

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        // deleting twice is fine
        cache.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_expiration() {
        let cache = LocalCache::new();
        cache
            .set_with_ttl("k", "v", Duration::from_millis(100))
            .await
            .unwrap();
        assert!(cache.exists("k").await.unwrap());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!cache.exists("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_refreshes_ttl() {
        let cache = LocalCache::new();
        let ttl = Duration::from_millis(200);
        assert_eq!(cache.incr_with_ttl("c", ttl).await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.incr_with_ttl("c", ttl).await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(120)).await;
        // still alive: the second increment pushed the deadline out
        assert_eq!(cache.get("c").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_incr_restarts_after_expiry() {
        let cache = LocalCache::new();
        let ttl = Duration::from_millis(100);
        cache.incr_with_ttl("c", ttl).await.unwrap();
        cache.incr_with_ttl("c", ttl).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.incr_with_ttl("c", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_incr_non_integer_errors() {
        let cache = LocalCache::new();
        cache
            .set_with_ttl("c", "abc", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.incr_with_ttl("c", Duration::from_secs(60)).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_incr_is_atomic() {
        let cache = LocalCache::new();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .incr_with_ttl("c", Duration::from_secs(60))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.get("c").await.unwrap(), Some("50".to_string()));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = LocalCache::new();
        cache
            .set_with_ttl("short", "1", Duration::from_millis(50))
            .await
            .unwrap();
        cache
            .set_with_ttl("long", "1", Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_an_error() {
        let cache = LocalCache::new();
        assert!(matches!(
            cache.set_with_ttl("k", "v", Duration::MAX).await,
            Err(CacheError::Unavailable { .. })
        ));
        assert!(cache.incr_with_ttl("c", Duration::MAX).await.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let cache = LocalCache::new();
        cache.set_unavailable(true);
        assert!(matches!(
            cache.get("k").await,
            Err(CacheError::Unavailable { .. })
        ));
    }
}
