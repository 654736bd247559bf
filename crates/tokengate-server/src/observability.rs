//! Process-wide tracing subscriber.
//!
//! The filter sits behind a reload layer: the process starts at
//! [`DEFAULT_LEVEL`] and switches to the configured level once the config
//! file has been read. `RUST_LOG` overrides both.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

pub const DEFAULT_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level(DEFAULT_LEVEL);
}

pub fn init_tracing_with_level(level: &str) {
    let initial = env_filter().unwrap_or_else(|| {
        parse_filter(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    });
    let (filter_layer, handle) = reload::Layer::new(initial);
    if FILTER_HANDLE.set(handle).is_err() {
        return;
    }

    // Fails only if a global subscriber is already installed (tests).
    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer())
        .try_init();
}

/// Switches the active filter to `level`.
///
/// Skipped while `RUST_LOG` is set. A level that does not parse, or a
/// subscriber that is gone, leaves the current filter in place.
pub fn apply_logging_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing::debug!(level, "RUST_LOG is set, ignoring configured logging level");
        return;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return;
    };
    if let Err(e) = reload_filter(handle, level) {
        tracing::warn!(error = %e, level, "Failed to apply logging level");
    }
}

fn env_filter() -> Option<EnvFilter> {
    std::env::var_os("RUST_LOG")?;
    EnvFilter::try_from_default_env().ok()
}

fn parse_filter(level: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(level).map_err(|e| format!("invalid filter {level:?}: {e}"))
}

fn reload_filter(handle: &FilterHandle, level: &str) -> Result<(), String> {
    let filter = parse_filter(level)?;
    handle
        .reload(filter)
        .map_err(|e| format!("filter reload failed: {e}"))
}
