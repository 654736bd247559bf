//! Arc-owning storage adapter implementing [`DurableStore`].
//!
//! Wraps the lifetime-based storage types and owns an `Arc<PgPool>`, so it
//! can be handed to the token lifecycle manager as `Arc<dyn DurableStore>`.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use tokengate_auth::storage::{DurableStore, StoreError, StoreResult};
use tokengate_auth::{Principal, TokenPair};

use crate::principal::PrincipalStorage;
use crate::token::TokenStorage;
use crate::{PgPool, StorageError};

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(message) => StoreError::conflict(message),
            other => StoreError::unavailable(other.to_string()),
        }
    }
}

/// Arc-owning PostgreSQL durable store.
#[derive(Clone)]
pub struct PostgresDurableStore {
    pool: Arc<PgPool>,
}

impl PostgresDurableStore {
    /// Create a new Arc-owning durable store.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DurableStore for PostgresDurableStore {
    async fn create_principal(&self, principal: &Principal) -> StoreResult<()> {
        let storage = PrincipalStorage::new(&self.pool);
        storage.create(principal).await.map_err(StoreError::from)
    }

    async fn get_principal_by_username(&self, username: &str) -> StoreResult<Option<Principal>> {
        let storage = PrincipalStorage::new(&self.pool);
        let row = storage.find_by_username(username).await?;
        row.map(|r| r.into_principal()).transpose().map_err(StoreError::from)
    }

    async fn get_principal_by_id(&self, id: Uuid) -> StoreResult<Option<Principal>> {
        let storage = PrincipalStorage::new(&self.pool);
        let row = storage.find_by_id(id).await?;
        row.map(|r| r.into_principal()).transpose().map_err(StoreError::from)
    }

    async fn create_token_pair(&self, pair: &TokenPair) -> StoreResult<()> {
        let storage = TokenStorage::new(&self.pool);
        storage.create(pair).await.map_err(StoreError::from)
    }

    async fn get_token_pair_by_access_token(
        &self,
        access_token: &str,
    ) -> StoreResult<Option<TokenPair>> {
        let storage = TokenStorage::new(&self.pool);
        Ok(storage.find_by_access_token(access_token).await?)
    }

    async fn get_token_pair_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> StoreResult<Option<TokenPair>> {
        let storage = TokenStorage::new(&self.pool);
        Ok(storage.find_by_refresh_token(refresh_token).await?)
    }

    async fn delete_token_pair_by_access_token(&self, access_token: &str) -> StoreResult<bool> {
        let storage = TokenStorage::new(&self.pool);
        Ok(storage.delete_by_access_token(access_token).await?)
    }

    async fn delete_token_pairs_by_principal(
        &self,
        principal_id: Uuid,
    ) -> StoreResult<Vec<TokenPair>> {
        let storage = TokenStorage::new(&self.pool);
        Ok(storage.delete_by_principal(principal_id).await?)
    }

    async fn delete_expired_token_pairs(&self, now: OffsetDateTime) -> StoreResult<u64> {
        let storage = TokenStorage::new(&self.pool);
        Ok(storage.delete_expired(now).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_store_conflict() {
        let err: StoreError = StorageError::conflict("dup").into();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_database_error_maps_to_unavailable() {
        let err: StoreError = StorageError::from(sqlx_core::Error::PoolTimedOut).into();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }
}
