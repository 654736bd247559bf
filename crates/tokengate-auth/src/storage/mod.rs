//! Durable storage for principals and token pairs.
//!
//! The durable store is the source of truth for which token pairs exist.
//! Lookups return `Ok(None)` for "not found" so callers can tell a missing
//! row from a backend failure.
//!
//! # Implementations
//!
//! - [`memory::InMemoryStore`] - single-process store, also used in tests
//! - `tokengate-auth-postgres` - PostgreSQL storage backend

pub mod memory;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::{Principal, TokenPair};

pub use memory::InMemoryStore;

// =============================================================================
// Error Types
// =============================================================================

/// Errors reported by a [`DurableStore`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// A unique key (username, access or refresh token) is already taken.
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
    },

    /// The backend could not be reached or the query failed.
    #[error("Store unavailable: {message}")]
    Unavailable {
        message: String,
    },

    /// The call exceeded its deadline.
    #[error("Store timeout: {operation}")]
    Timeout {
        operation: String,
    },
}

impl StoreError {
    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

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

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Durable Store Trait
// =============================================================================

/// Persistence for principals and token pairs.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Inserts a new principal.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the username is taken.
    async fn create_principal(&self, principal: &Principal) -> StoreResult<()>;

    /// Finds a principal by username.
    async fn get_principal_by_username(&self, username: &str) -> StoreResult<Option<Principal>>;

    /// Finds a principal by id.
    async fn get_principal_by_id(&self, id: Uuid) -> StoreResult<Option<Principal>>;

    /// Inserts a token pair.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if either token already exists.
    async fn create_token_pair(&self, pair: &TokenPair) -> StoreResult<()>;

    /// Finds a token pair by its access token.
    async fn get_token_pair_by_access_token(
        &self,
        access_token: &str,
    ) -> StoreResult<Option<TokenPair>>;

    /// Finds a token pair by its refresh token.
    async fn get_token_pair_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> StoreResult<Option<TokenPair>>;

    /// Deletes a token pair by its access token.
    ///
    /// Returns `true` if a row was deleted.
    async fn delete_token_pair_by_access_token(&self, access_token: &str) -> StoreResult<bool>;

    /// Deletes every token pair belonging to a principal and returns them.
    async fn delete_token_pairs_by_principal(&self, principal_id: Uuid)
    -> StoreResult<Vec<TokenPair>>;

    /// Deletes every token pair that expired before `now`.
    ///
    /// Returns the number of rows deleted.
    async fn delete_expired_token_pairs(&self, now: OffsetDateTime) -> StoreResult<u64>;
}
