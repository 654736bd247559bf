//! Core domain types: principals and token pairs.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;

// =============================================================================
// Principal
// =============================================================================

/// Account status of a principal.
///
/// Persisted as a small integer (`1` = normal, `2` = banned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalStatus {
    Normal,
    Banned,
}

impl PrincipalStatus {
    /// Integer code used by durable stores.
    #[must_use]
    pub fn code(self) -> i16 {
        match self {
            Self::Normal => 1,
            Self::Banned => 2,
        }
    }

    /// Parses a stored integer code.
    #[must_use]
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Normal),
            2 => Some(Self::Banned),
            _ => None,
        }
    }

    /// Returns `true` if the principal may hold sessions.
    #[must_use]
    pub fn is_active(self) -> bool {
        self == Self::Normal
    }
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    /// PHC-formatted Argon2 hash. Never the plaintext.
    pub password_hash: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: PrincipalStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Principal {
    /// Creates a new normal-status principal with a fresh id.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        email: impl Into<String>,
        phone: Option<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            password_hash: password_hash.into(),
            email: email.into(),
            phone,
            status: PrincipalStatus::Normal,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Token Pair
// =============================================================================

/// An access/refresh token pair bound to one principal.
///
/// `expires_at` bounds the whole row: the refresh token is accepted only
/// while the access token would still be valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub principal_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TokenPair {
    /// Returns `true` if the pair has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    /// Remaining lifetime at `now`, zero once expired.
    #[must_use]
    pub fn remaining_at(&self, now: OffsetDateTime) -> std::time::Duration {
        let remaining = self.expires_at - now;
        if remaining.is_positive() {
            remaining.unsigned_abs()
        } else {
            std::time::Duration::ZERO
        }
    }
}

// =============================================================================
// Operation Results
// =============================================================================

/// Tokens handed back to the caller on login, registration and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<&TokenPair> for IssuedTokens {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            expires_at: pair.expires_at,
        }
    }
}

/// Outcome of a registration.
///
/// The principal exists once this is returned. `session` carries the result
/// of issuing the initial token pair, which may fail independently.
#[derive(Debug)]
pub struct Registration {
    pub principal_id: Uuid,
    pub session: AuthResult<IssuedTokens>,
}

/// Identity behind a valid access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedPrincipal {
    pub principal_id: Uuid,
    pub username: String,
}
