//! Session and credential error types.
//!
//! Every operation of [`TokenLifecycleManager`](crate::service::TokenLifecycleManager)
//! reports failures through [`AuthError`]. Lower layers have their own error
//! types ([`StoreError`], [`CacheError`]) which are converted here.

use std::fmt;

use crate::cache::CacheError;
use crate::storage::StoreError;

/// Errors returned by session-token operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request is missing required input.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// A principal with this username already exists.
    #[error("Principal already exists: {username}")]
    AlreadyExists {
        /// The conflicting username.
        username: String,
    },

    /// Unknown username or wrong password. The two cases are not distinguished.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// The failed-login counter for this username reached the threshold.
    #[error("Too many login attempts")]
    TooManyAttempts,

    /// The principal exists but is banned.
    #[error("Account is banned")]
    AccountBanned,

    /// The token is valid but its principal is missing or no longer active.
    #[error("Account invalid: {message}")]
    AccountInvalid {
        /// Description of why the account is not usable.
        message: String,
    },

    /// The presented token is not known.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// No token pair exists for the presented access token.
    #[error("Token not found")]
    TokenNotFound,

    /// The token pair exists but its lifetime has elapsed.
    #[error("Token expired")]
    TokenExpired,

    /// The token has been explicitly revoked.
    #[error("Token revoked")]
    TokenRevoked,

    /// The durable store (or, for blacklist checks, the cache) could not
    /// answer a security-relevant read or write.
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the backend failure.
        message: String,
    },

    /// The ephemeral cache failed. Never surfaced by the manager, which
    /// degrades to the store instead.
    #[error("Cache unavailable: {message}")]
    CacheUnavailable {
        /// Description of the cache failure.
        message: String,
    },

    /// A backend call exceeded its configured deadline.
    #[error("Operation timed out: {operation}")]
    Timeout {
        /// The backend operation that timed out.
        operation: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(username: impl Into<String>) -> Self {
        Self::AlreadyExists {
            username: username.into(),
        }
    }

    /// Creates a new `AccountInvalid` error.
    #[must_use]
    pub fn account_invalid(message: impl Into<String>) -> Self {
        Self::AccountInvalid {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `StoreUnavailable` error.
    #[must_use]
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `CacheUnavailable` error.
    #[must_use]
    pub fn cache_unavailable(message: impl Into<String>) -> Self {
        Self::CacheUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. }
                | Self::AlreadyExists { .. }
                | Self::InvalidCredentials
                | Self::TooManyAttempts
                | Self::AccountBanned
                | Self::AccountInvalid { .. }
                | Self::InvalidToken { .. }
                | Self::TokenNotFound
                | Self::TokenExpired
                | Self::TokenRevoked
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. }
                | Self::CacheUnavailable { .. }
                | Self::Timeout { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if this is a token-related error.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. } | Self::TokenNotFound | Self::TokenExpired | Self::TokenRevoked
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::AlreadyExists { .. } => ErrorCategory::Validation,
            Self::InvalidCredentials => ErrorCategory::Authentication,
            Self::TooManyAttempts => ErrorCategory::Throttling,
            Self::AccountBanned => ErrorCategory::Authentication,
            Self::AccountInvalid { .. } => ErrorCategory::Authentication,
            Self::InvalidToken { .. } => ErrorCategory::Token,
            Self::TokenNotFound => ErrorCategory::Token,
            Self::TokenExpired => ErrorCategory::Token,
            Self::TokenRevoked => ErrorCategory::Token,
            Self::StoreUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::CacheUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::Timeout { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns a stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::AlreadyExists { .. } => "already_exists",
            Self::InvalidCredentials => "invalid_credentials",
            Self::TooManyAttempts => "too_many_attempts",
            Self::AccountBanned => "account_banned",
            Self::AccountInvalid { .. } => "account_invalid",
            Self::InvalidToken { .. } => "invalid_token",
            Self::TokenNotFound => "token_not_found",
            Self::TokenExpired => "token_expired",
            Self::TokenRevoked => "token_revoked",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::CacheUnavailable { .. } => "cache_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout { operation } => Self::timeout(operation),
            StoreError::Unavailable { message } => Self::store_unavailable(message),
            // Callers that expect a conflict match it before converting.
            StoreError::Conflict { message } => Self::internal(format!("unexpected conflict: {message}")),
        }
    }
}

impl From<CacheError> for AuthError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Timeout { operation } => Self::timeout(operation),
            CacheError::Unavailable { message } => Self::cache_unavailable(message),
        }
    }
}

/// Categories of errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential and account checks.
    Authentication,
    /// Failed-login throttling.
    Throttling,
    /// Token validation, expiration and revocation.
    Token,
    /// Request validation errors.
    Validation,
    /// Store or cache failures.
    Infrastructure,
    /// Internal server errors.
    Internal,
}

impl ErrorCategory {
    /// Returns the category as a metric label value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Throttling => "throttling",
            Self::Token => "token",
            Self::Validation => "validation",
            Self::Infrastructure => "infrastructure",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid username or password"
        );
        assert_eq!(
            AuthError::already_exists("alice").to_string(),
            "Principal already exists: alice"
        );
        assert_eq!(
            AuthError::timeout("get_principal_by_username").to_string(),
            "Operation timed out: get_principal_by_username"
        );
    }

    #[test]
    fn test_client_and_server_errors_are_disjoint() {
        let all = [
            AuthError::invalid_request("x"),
            AuthError::already_exists("x"),
            AuthError::InvalidCredentials,
            AuthError::TooManyAttempts,
            AuthError::AccountBanned,
            AuthError::account_invalid("x"),
            AuthError::invalid_token("x"),
            AuthError::TokenNotFound,
            AuthError::TokenExpired,
            AuthError::TokenRevoked,
            AuthError::store_unavailable("x"),
            AuthError::cache_unavailable("x"),
            AuthError::timeout("x"),
            AuthError::internal("x"),
        ];
        for err in &all {
            assert_ne!(err.is_client_error(), err.is_server_error(), "{err}");
        }
    }

    #[test]
    fn test_token_errors() {
        assert!(AuthError::TokenExpired.is_token_error());
        assert!(AuthError::TokenRevoked.is_token_error());
        assert!(AuthError::TokenNotFound.is_token_error());
        assert!(AuthError::invalid_token("gone").is_token_error());
        assert!(!AuthError::InvalidCredentials.is_token_error());
    }

    #[test]
    fn test_too_many_attempts_is_distinguishable() {
        let err = AuthError::TooManyAttempts;
        assert_eq!(err.code(), "too_many_attempts");
        assert_eq!(err.category(), ErrorCategory::Throttling);
        assert_ne!(err.code(), AuthError::InvalidCredentials.code());
    }

    #[test]
    fn test_from_store_error() {
        let err: AuthError = StoreError::timeout("create_token_pair").into();
        assert!(matches!(err, AuthError::Timeout { .. }));

        let err: AuthError = StoreError::unavailable("connection refused").into();
        assert!(matches!(err, AuthError::StoreUnavailable { .. }));
        assert_eq!(err.category(), ErrorCategory::Infrastructure);
    }

    #[test]
    fn test_from_cache_error() {
        let err: AuthError = CacheError::unavailable("pool exhausted").into();
        assert_eq!(err.code(), "cache_unavailable");

        let err: AuthError = CacheError::timeout("get").into();
        assert_eq!(err.code(), "timeout");
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Throttling.to_string(), "throttling");
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
