//! # tokengate-server
//!
//! Process wiring for the session-token service: configuration, logging,
//! the Prometheus exporter, the durable store and cache backends, and the
//! expired-token sweeper.

pub mod cache;
pub mod config;
pub mod metrics;
pub mod observability;
pub mod sweeper;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokengate_auth::{
    AuthConfig, DurableStore, EphemeralCache, InMemoryStore, LocalCache, TokenLifecycleManager,
};
use tokengate_auth_postgres::{PostgresAuthStorage, PostgresDurableStore, migrations};

pub use cache::RedisCache;
pub use config::{AppConfig, RedisConfig, StorageBackend};
pub use sweeper::TokenSweeper;

// =============================================================================
// Cache
// =============================================================================

/// Selected cache backend.
#[derive(Clone)]
pub enum CacheBackend {
    /// Process-local cache
    Local(Arc<LocalCache>),
    /// Redis cache shared across instances
    Redis(RedisCache),
}

impl CacheBackend {
    #[must_use]
    pub fn new_local() -> Self {
        Self::Local(Arc::new(LocalCache::new()))
    }

    #[must_use]
    pub fn new_redis(pool: deadpool_redis::Pool) -> Self {
        Self::Redis(RedisCache::new(pool))
    }

    /// The cache as a trait object for the lifecycle manager.
    #[must_use]
    pub fn shared(&self) -> Arc<dyn EphemeralCache> {
        match self {
            Self::Local(local) => Arc::clone(local) as Arc<dyn EphemeralCache>,
            Self::Redis(redis) => Arc::new(redis.clone()),
        }
    }

    /// The process-local cache, if that is the active backend.
    #[must_use]
    pub fn local_cache(&self) -> Option<&Arc<LocalCache>> {
        match self {
            Self::Local(local) => Some(local),
            Self::Redis(_) => None,
        }
    }

    #[must_use]
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Local(local) => local.backend_name(),
            Self::Redis(redis) => redis.backend_name(),
        }
    }
}

/// Create the cache backend based on configuration.
///
/// If Redis is enabled but unreachable, falls back to the local cache. A
/// local cache is correct for a single instance only: blacklist entries and
/// failure counters are not shared.
pub async fn create_cache_backend(config: &RedisConfig) -> CacheBackend {
    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::new_local();
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let timeout = Duration::from_millis(config.timeout_ms);
    let pool_config = redis_config
        .pool
        .get_or_insert_with(|| deadpool_redis::PoolConfig::new(config.pool_size));
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            return CacheBackend::new_local();
        }
    };

    // Test connection
    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            CacheBackend::new_redis(pool)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to local cache."
            );
            CacheBackend::new_local()
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Create the durable store based on configuration.
///
/// For PostgreSQL this connects the pool and applies the embedded
/// migrations before returning.
pub async fn create_store(config: &AppConfig) -> anyhow::Result<Arc<dyn DurableStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store; principals and tokens are lost on restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let pg = config
                .storage
                .postgres
                .as_ref()
                .context("storage.postgres is required for the postgres backend")?;

            tracing::info!(host = %pg.host, database = %pg.database, "Connecting to PostgreSQL");
            let storage = PostgresAuthStorage::connect_with(&pg.connection_url(), &pg.pool_settings())
                .await
                .context("failed to connect to PostgreSQL")?;

            migrations::run(storage.pool())
                .await
                .context("failed to apply migrations")?;
            tracing::info!("Database migrations applied");

            Ok(Arc::new(PostgresDurableStore::new(storage.pool_arc())))
        }
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Build the lifecycle manager over an already selected store and cache.
pub fn create_manager(
    store: Arc<dyn DurableStore>,
    cache: &CacheBackend,
    auth: &AuthConfig,
) -> anyhow::Result<TokenLifecycleManager> {
    TokenLifecycleManager::new(store, cache.shared(), auth.clone())
        .context("failed to create token lifecycle manager")
}

/// Start the sweeper if enabled. Returns its shutdown sender.
pub fn spawn_token_sweeper(
    config: &AppConfig,
    manager: &TokenLifecycleManager,
    cache: &CacheBackend,
) -> Option<(tokio::sync::watch::Sender<bool>, tokio::task::JoinHandle<()>)> {
    if !config.sweeper.enabled {
        tracing::info!("Token sweeper disabled");
        return None;
    }

    let mut sweeper = TokenSweeper::new(manager.clone(), config.sweeper.interval);
    if let Some(local) = cache.local_cache() {
        sweeper = sweeper.with_local_cache(Arc::clone(local));
    }
    Some(sweeper.start())
}
