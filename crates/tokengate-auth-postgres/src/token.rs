//! Token pair storage.
//!
//! One row per issued access/refresh pair. Rows are deleted on logout,
//! refresh and revoke-all, and swept once `expires_at` has passed.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use tokengate_auth::TokenPair;

use crate::{PgPool, StorageResult, map_unique_violation};

// =============================================================================
// Types
// =============================================================================

type TokenTuple = (String, String, Uuid, OffsetDateTime, OffsetDateTime);

fn pair_from_tuple(row: TokenTuple) -> TokenPair {
    TokenPair {
        access_token: row.0,
        refresh_token: row.1,
        principal_id: row.2,
        expires_at: row.3,
        created_at: row.4,
    }
}

// =============================================================================
// Token Storage
// =============================================================================

/// Token pair storage operations on the `token_pairs` table.
pub struct TokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenStorage<'a> {
    /// Create a new token storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a token pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if either token already exists.
    pub async fn create(&self, pair: &TokenPair) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO token_pairs (access_token, refresh_token, principal_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&pair.access_token)
        .bind(&pair.refresh_token)
        .bind(pair.principal_id)
        .bind(pair.expires_at)
        .bind(pair.created_at)
        .execute(self.pool)
        .await
        .map_err(|e| map_unique_violation(e, || "token pair already exists".to_string()))?;

        Ok(())
    }

    /// Find a pair by access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_access_token(&self, access_token: &str) -> StorageResult<Option<TokenPair>> {
        let row: Option<TokenTuple> = query_as(
            r#"
            SELECT access_token, refresh_token, principal_id, expires_at, created_at
            FROM token_pairs
            WHERE access_token = $1
            "#,
        )
        .bind(access_token)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(pair_from_tuple))
    }

    /// Find a pair by refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> StorageResult<Option<TokenPair>> {
        let row: Option<TokenTuple> = query_as(
            r#"
            SELECT access_token, refresh_token, principal_id, expires_at, created_at
            FROM token_pairs
            WHERE refresh_token = $1
            "#,
        )
        .bind(refresh_token)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(pair_from_tuple))
    }

    /// Delete a pair by access token.
    ///
    /// Returns `true` if a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete_by_access_token(&self, access_token: &str) -> StorageResult<bool> {
        let result = query(
            r#"
            DELETE FROM token_pairs
            WHERE access_token = $1
            "#,
        )
        .bind(access_token)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete all pairs of a principal and return them.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete_by_principal(&self, principal_id: Uuid) -> StorageResult<Vec<TokenPair>> {
        let rows: Vec<TokenTuple> = query_as(
            r#"
            DELETE FROM token_pairs
            WHERE principal_id = $1
            RETURNING access_token, refresh_token, principal_id, expires_at, created_at
            "#,
        )
        .bind(principal_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(pair_from_tuple).collect())
    }

    /// Delete pairs that expired before `now`.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64> {
        let result = query(
            r#"
            DELETE FROM token_pairs
            WHERE expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
