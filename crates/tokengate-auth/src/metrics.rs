//! Metrics for session-token operations.
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the
//! host process installs a recorder.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::AuthResult;

/// Metric names as constants for consistency.
pub mod names {
    pub const AUTH_OPERATIONS_TOTAL: &str = "auth_operations_total";
    pub const AUTH_OPERATION_DURATION_SECONDS: &str = "auth_operation_duration_seconds";
    pub const AUTH_CACHE_LOOKUPS_TOTAL: &str = "auth_cache_lookups_total";
    pub const AUTH_BLACKLIST_WRITE_FAILURES_TOTAL: &str = "auth_blacklist_write_failures_total";
    pub const AUTH_TOKENS_SWEPT_TOTAL: &str = "auth_tokens_swept_total";
}

/// Operation labels.
pub mod ops {
    pub const REGISTER: &str = "register";
    pub const LOGIN: &str = "login";
    pub const REFRESH: &str = "refresh";
    pub const LOGOUT: &str = "logout";
    pub const VALIDATE: &str = "validate";
    pub const REVOKE_ALL: &str = "revoke_all";
    pub const SWEEP: &str = "sweep";
}

/// Record the outcome and latency of an operation.
///
/// The `status` label is `success` or the error code; `category` groups
/// error codes and is `none` on success.
pub fn record_operation<T>(operation: &'static str, result: &AuthResult<T>, duration: Duration) {
    let (status, category) = outcome_labels(result);

    counter!(
        names::AUTH_OPERATIONS_TOTAL,
        "operation" => operation,
        "status" => status,
        "category" => category
    )
    .increment(1);

    histogram!(
        names::AUTH_OPERATION_DURATION_SECONDS,
        "operation" => operation
    )
    .record(duration.as_secs_f64());
}

fn outcome_labels<T>(result: &AuthResult<T>) -> (&'static str, &'static str) {
    match result {
        Ok(_) => ("success", "none"),
        Err(e) => (e.code(), e.category().as_str()),
    }
}

/// Record a token projection lookup (`hit`, `miss` or `error`).
pub fn record_cache_lookup(result: &'static str) {
    counter!(names::AUTH_CACHE_LOOKUPS_TOTAL, "result" => result).increment(1);
}

/// Record a blacklist write that failed after all attempts.
pub fn record_blacklist_write_failure() {
    counter!(names::AUTH_BLACKLIST_WRITE_FAILURES_TOTAL).increment(1);
}

/// Record token pairs removed by the expiry sweep.
pub fn record_tokens_swept(count: u64) {
    counter!(names::AUTH_TOKENS_SWEPT_TOTAL).increment(count);
}
