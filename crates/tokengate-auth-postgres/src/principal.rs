//! Principal storage.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use tokengate_auth::{Principal, PrincipalStatus};

use crate::{PgPool, StorageError, StorageResult, map_unique_violation};

// =============================================================================
// Types
// =============================================================================

type PrincipalTuple = (
    Uuid,
    String,
    String,
    String,
    Option<String>,
    i16,
    OffsetDateTime,
    OffsetDateTime,
);

/// Principal record from database.
#[derive(Debug, Clone)]
pub struct PrincipalRow {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub phone: Option<String>,
    /// Raw status code (`1` normal, `2` banned)
    pub status: i16,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PrincipalRow {
    fn from_tuple(row: PrincipalTuple) -> Self {
        Self {
            id: row.0,
            username: row.1,
            password_hash: row.2,
            email: row.3,
            phone: row.4,
            status: row.5,
            created_at: row.6,
            updated_at: row.7,
        }
    }

    /// Converts to the domain type.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidRow` if the status code is unknown.
    pub fn into_principal(self) -> StorageResult<Principal> {
        let status = PrincipalStatus::from_code(self.status).ok_or_else(|| {
            StorageError::invalid_row(format!(
                "principal {} has unknown status {}",
                self.id, self.status
            ))
        })?;
        Ok(Principal {
            id: self.id,
            username: self.username,
            password_hash: self.password_hash,
            email: self.email,
            phone: self.phone,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// =============================================================================
// Principal Storage
// =============================================================================

/// Principal storage operations on the `principals` table.
pub struct PrincipalStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> PrincipalStorage<'a> {
    /// Create a new principal storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a principal.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id or username already exists.
    pub async fn create(&self, principal: &Principal) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO principals
                (id, username, password_hash, email, phone, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(principal.id)
        .bind(&principal.username)
        .bind(&principal.password_hash)
        .bind(&principal.email)
        .bind(&principal.phone)
        .bind(principal.status.code())
        .bind(principal.created_at)
        .bind(principal.updated_at)
        .execute(self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(e, || {
                format!("principal '{}' already exists", principal.username)
            })
        })?;

        Ok(())
    }

    /// Find a principal by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_username(&self, username: &str) -> StorageResult<Option<PrincipalRow>> {
        let row: Option<PrincipalTuple> = query_as(
            r#"
            SELECT id, username, password_hash, email, phone, status, created_at, updated_at
            FROM principals
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(PrincipalRow::from_tuple))
    }

    /// Find a principal by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<PrincipalRow>> {
        let row: Option<PrincipalTuple> = query_as(
            r#"
            SELECT id, username, password_hash, email, phone, status, created_at, updated_at
            FROM principals
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(PrincipalRow::from_tuple))
    }

    /// Set a principal's status.
    ///
    /// Returns `true` if a row was updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn set_status(&self, id: Uuid, status: PrincipalStatus) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE principals
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.code())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: i16) -> PrincipalRow {
        let now = OffsetDateTime::now_utc();
        PrincipalRow {
            id: Uuid::new_v4(),
            username: "alice".into(),
            password_hash: "$argon2id$...".into(),
            email: "alice@example.com".into(),
            phone: None,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_into_principal() {
        let principal = row(2).into_principal().unwrap();
        assert_eq!(principal.status, PrincipalStatus::Banned);
        assert_eq!(principal.username, "alice");
    }

    #[test]
    fn test_row_with_unknown_status() {
        let err = row(0).into_principal().unwrap_err();
        assert!(matches!(err, StorageError::InvalidRow(_)));
    }
}
