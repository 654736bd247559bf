//! Cache backends for the session-token service.
//!
//! - Local mode: [`tokengate_auth::LocalCache`], state lives in this process
//! - Redis mode: [`RedisCache`], state is shared by every instance

pub mod redis;

pub use self::redis::RedisCache;
