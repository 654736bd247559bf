//! Redis-backed [`EphemeralCache`].
//!
//! Every call checks a connection out of the deadpool pool and issues a
//! single command or an atomic pipeline. Errors surface as
//! [`CacheError::Unavailable`]; deadlines are applied by the caller.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;

use tokengate_auth::{CacheError, CacheResult, EphemeralCache};

/// Shared cache on a Redis connection pool.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> CacheResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::unavailable(format!("redis pool: {e}")))
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn command_error(command: &str, key: &str, err: redis::RedisError) -> CacheError {
    tracing::warn!(command, key = %key, error = %err, "Redis command failed");
    CacheError::unavailable(format!("redis {command}: {err}"))
}

#[async_trait]
impl EphemeralCache for RedisCache {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
            .await
            .map_err(|e| command_error("PSETEX", key, e))
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| command_error("GET", key, e))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| command_error("DEL", key, e))
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        let mut conn = self.conn().await?;
        let ttl_ms = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .pexpire(key, ttl_ms)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("INCR", key, e))?;
        Ok(count)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn().await?;
        conn.exists::<_, bool>(key)
            .await
            .map_err(|e| command_error("EXISTS", key, e))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
