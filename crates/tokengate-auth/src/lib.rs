//! # tokengate-auth
//!
//! Session-token lifecycle and login throttling.
//!
//! This crate provides:
//! - Argon2id credential hashing
//! - Opaque access/refresh token generation
//! - Storage traits for principals and token pairs, plus an in-memory store
//! - Cache traits for token projections, the blacklist and failure counters,
//!   plus an in-process cache
//! - Per-username failed-login throttling
//! - [`TokenLifecycleManager`], which ties these together
//!
//! ## Modules
//!
//! - [`config`] - Token lifetime, throttle, timeout and hashing settings
//! - [`error`] - Error types
//! - [`password`] - Credential hashing
//! - [`secret`] - Opaque token generation
//! - [`storage`] - Durable store trait and in-memory implementation
//! - [`cache`] - Ephemeral cache trait and in-process implementation
//! - [`throttle`] - Failed-login counters
//! - [`service`] - Register, login, refresh, logout and validate
//! - [`metrics`] - Operation counters and latencies
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokengate_auth::{AuthConfig, InMemoryStore, LocalCache, TokenLifecycleManager};
//!
//! let manager = TokenLifecycleManager::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(LocalCache::new()),
//!     AuthConfig::default(),
//! )?;
//!
//! let registration = manager.register("alice", "s3cret", "alice@example.com", None).await?;
//! let tokens = manager.login("alice", "s3cret").await?;
//! let who = manager.validate_token(&tokens.access_token).await?;
//! manager.logout(&tokens.access_token).await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod password;
pub mod secret;
pub mod service;
pub mod storage;
pub mod throttle;
pub mod types;

pub use cache::{CacheError, CacheResult, EphemeralCache, LocalCache};
pub use config::{AuthConfig, ConfigError, PasswordHashingConfig, ThrottleConfig, TimeoutConfig};
pub use error::{AuthError, ErrorCategory};
pub use password::CredentialHasher;
pub use secret::SecretGenerator;
pub use service::TokenLifecycleManager;
pub use storage::{DurableStore, InMemoryStore, StoreError, StoreResult};
pub use throttle::{FailureOutcome, LoginThrottle};
pub use types::{
    IssuedTokens, Principal, PrincipalStatus, Registration, TokenPair, ValidatedPrincipal,
};

/// Type alias for session-token operation results.
pub type AuthResult<T> = Result<T, AuthError>;
