//! PostgreSQL storage backend for Tokengate.
//!
//! Provides persistent storage for:
//!
//! - Principals (`principals` table)
//! - Access/refresh token pairs (`token_pairs` table)
//!
//! The schema ships as embedded migrations, applied by [`migrations::run`].
//!
//! # Example
//!
//! ```ignore
//! use tokengate_auth_postgres::{PostgresAuthStorage, PostgresDurableStore};
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/tokengate").await?;
//! tokengate_auth_postgres::migrations::run(storage.pool()).await?;
//!
//! let principal = storage.principals().find_by_username("alice").await?;
//! let store = PostgresDurableStore::new(storage.pool_arc());
//! ```

pub mod migrations;
pub mod principal;
pub mod storage_adapters;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use principal::PrincipalStorage;
pub use storage_adapters::PostgresDurableStore;
pub use token::TokenStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during auth storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Resource already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored row could not be mapped to a domain type.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StorageError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidRow` error.
    #[must_use]
    pub fn invalid_row(message: impl Into<String>) -> Self {
        Self::InvalidRow(message.into())
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Returns `true` if this is a client error (4xx equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a server error (5xx equivalent).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::InvalidRow(_) | Self::Migration(_)
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Maps a unique-key violation to `Conflict`, anything else to `Database`.
pub(crate) fn map_unique_violation(
    err: sqlx_core::Error,
    message: impl FnOnce() -> String,
) -> StorageError {
    if let sqlx_core::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return StorageError::conflict(message());
    }
    StorageError::from(err)
}

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// Connection pool settings for [`PostgresAuthStorage::connect_with`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: None,
        }
    }
}

/// PostgreSQL storage backend for principals and token pairs.
///
/// Holds a connection pool and hands out borrowing storage types per table.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with(database_url, &PoolSettings::default()).await
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect_with(database_url: &str, settings: &PoolSettings) -> StorageResult<Self> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(settings.idle_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the Arc-wrapped pool.
    #[must_use]
    pub fn pool_arc(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    /// Get principal storage operations.
    #[must_use]
    pub fn principals(&self) -> PrincipalStorage<'_> {
        PrincipalStorage::new(&self.pool)
    }

    /// Get token pair storage operations.
    #[must_use]
    pub fn tokens(&self) -> TokenStorage<'_> {
        TokenStorage::new(&self.pool)
    }
}

// =============================================================================
// Tests
// =============================================================================
