//! Prometheus exporter for the session-token metrics.
//!
//! The auth crate records through the `metrics` facade; this module installs
//! the recorder and serves the scrape endpoint.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::MetricsConfig;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the Prometheus recorder and its HTTP listener.
///
/// Returns `true` if the exporter was installed by this call. Must be called
/// from within a Tokio runtime.
pub fn init_metrics(config: &MetricsConfig) -> bool {
    if !config.enabled {
        tracing::debug!("Prometheus metrics disabled");
        return false;
    }
    install(config.listen)
}

fn install(listen: SocketAddr) -> bool {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    match PrometheusBuilder::new().with_http_listener(listen).install() {
        Ok(()) => {
            tracing::info!(listen = %listen, "Prometheus metrics initialized");
            true
        }
        Err(e) => {
            INSTALLED.store(false, Ordering::SeqCst);
            tracing::error!(error = %e, "Failed to install Prometheus exporter");
            false
        }
    }
}
