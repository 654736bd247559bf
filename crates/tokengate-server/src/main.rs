use std::env;

use tokengate_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use tokengate_server::{
    create_cache_backend, create_manager, create_store, metrics, observability,
    spawn_token_sweeper,
};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From TOKENGATE_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (tokengate.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (TOKENGATE_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    let (config_path, source) = resolve_config_path();

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    observability::apply_logging_level(&cfg.logging.level);
    metrics::init_metrics(&cfg.metrics);

    let store = match create_store(&cfg).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Store initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    let cache = create_cache_backend(&cfg.redis).await;

    let manager = match create_manager(store, &cache, &cfg.auth) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Service initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        cache = cache.mode(),
        token_lifetime = ?manager.config().access_token_lifetime,
        max_attempts = manager.config().throttle.max_attempts,
        "Token service ready"
    );

    let sweeper = spawn_token_sweeper(&cfg, &manager, &cache);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");

    if let Some((shutdown, handle)) = sweeper {
        let _ = shutdown.send(true);
        let _ = handle.await;
    }
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: TOKENGATE_CONFIG
/// 3. Default: tokengate.toml
fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = env::var("TOKENGATE_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    (DEFAULT_CONFIG_FILE.to_string(), ConfigSource::Default)
}
