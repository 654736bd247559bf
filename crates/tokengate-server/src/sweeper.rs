//! Background removal of expired token pairs.
//!
//! Expired pairs already fail validation; the sweeper only keeps the durable
//! store from growing without bound. When the cache is process-local its
//! expired entries are purged on the same tick.

use std::sync::Arc;
use std::time::Duration;

use tokengate_auth::{LocalCache, TokenLifecycleManager};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

pub struct TokenSweeper {
    manager: TokenLifecycleManager,
    local_cache: Option<Arc<LocalCache>>,
    period: Duration,
}

impl TokenSweeper {
    #[must_use]
    pub fn new(manager: TokenLifecycleManager, period: Duration) -> Self {
        Self {
            manager,
            local_cache: None,
            period,
        }
    }

    /// Also purge expired entries from a process-local cache.
    #[must_use]
    pub fn with_local_cache(mut self, cache: Arc<LocalCache>) -> Self {
        self.local_cache = Some(cache);
        self
    }

    /// Run one sweep. Returns the number of token pairs removed.
    pub async fn run_once(&self) -> u64 {
        if let Some(ref cache) = self.local_cache {
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, "Purged expired local cache entries");
            }
        }

        match self.manager.sweep_expired().await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Token sweep failed");
                0
            }
        }
    }

    /// Start the sweeper in a background task.
    ///
    /// Send `true` on the returned channel to stop it.
    pub fn start(self) -> (watch::Sender<bool>, JoinHandle<()>) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(period = ?self.period, "Token sweeper started");

            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Token sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        (shutdown_tx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use tokengate_auth::{
        AuthConfig, DurableStore, EphemeralCache, InMemoryStore, Principal, TokenPair,
    };

    fn manager(store: Arc<InMemoryStore>, cache: Arc<LocalCache>) -> TokenLifecycleManager {
        let mut config = AuthConfig::default();
        config.password_hashing.memory_kib = 1024;
        config.password_hashing.iterations = 1;
        config.password_hashing.parallelism = 1;
        TokenLifecycleManager::new(store, cache, config).unwrap()
    }

    async fn seed_expired(store: &InMemoryStore) {
        let principal = Principal::new("alice", "$argon2id$x", "alice@example.com", None);
        store.create_principal(&principal).await.unwrap();
        let now = OffsetDateTime::now_utc();
        let pair = TokenPair {
            access_token: "stale-access".into(),
            refresh_token: "stale-refresh".into(),
            principal_id: principal.id,
            expires_at: now - time::Duration::seconds(5),
            created_at: now - time::Duration::hours(1),
        };
        store.create_token_pair(&pair).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_once_removes_expired_pairs() {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(LocalCache::new());
        seed_expired(&store).await;
        cache
            .set_with_ttl("auth:token:gone", "x", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let sweeper = TokenSweeper::new(
            manager(Arc::clone(&store), Arc::clone(&cache)),
            Duration::from_secs(60),
        )
        .with_local_cache(Arc::clone(&cache));

        assert_eq!(sweeper.run_once().await, 1);
        assert_eq!(store.token_pair_count(), 0);
        assert!(cache.is_empty());
        assert_eq!(sweeper.run_once().await, 0);
    }

    #[tokio::test]
    async fn test_run_once_survives_store_outage() {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(LocalCache::new());
        seed_expired(&store).await;
        store.set_unavailable(true);

        let sweeper = TokenSweeper::new(manager(Arc::clone(&store), cache), Duration::from_secs(60));
        assert_eq!(sweeper.run_once().await, 0);

        store.set_unavailable(false);
        assert_eq!(sweeper.run_once().await, 1);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(LocalCache::new());
        seed_expired(&store).await;

        let sweeper = TokenSweeper::new(
            manager(Arc::clone(&store), cache),
            Duration::from_millis(20),
        );
        let (shutdown, handle) = sweeper.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.token_pair_count(), 0);

        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
