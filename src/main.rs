use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use floodgate::cache::RedisCache;
use floodgate::config::{FloodgateConfig, StorageBackend, StorageConfig};
use floodgate::http::{app, HttpServer, ThrottleState};
use floodgate::ratelimit::{CounterStore, RateLimiter};
use floodgate::store::{BoundedMemoryCounterStore, PersistentCounterStore};

/// Fixed-window request throttling service.
#[derive(Debug, Parser)]
#[command(name = "floodgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "FLOODGATE_CONFIG")]
    config: Option<String>,

    /// Override the configured counter backend
    #[arg(long, value_enum)]
    backend: Option<StorageBackend>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, &cli.log_level);

    info!("Starting Floodgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = FloodgateConfig::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
        config.validate()?;
    }
    info!(
        http_addr = %config.server.http_addr,
        backend = ?config.storage.backend,
        enabled = config.enabled,
        "Configuration loaded"
    );

    let (catalog, classifier) = config.build_rules()?;
    info!(
        policies = catalog.len(),
        endpoint_rules = classifier.len(),
        "Rate limit rules loaded"
    );

    let store = build_store(&config.storage).await;
    let limiter = RateLimiter::new(store, catalog).with_key_prefix(config.storage.key_prefix.clone());
    let state = ThrottleState::new(Arc::new(limiter), Arc::new(classifier)).enabled(config.enabled);

    HttpServer::new(config.server.http_addr, app(state))
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("Floodgate stopped");
    Ok(())
}

fn init_tracing(format: LogFormat, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Build the configured counter store.
///
/// An unreachable persistent backend at boot falls back to the in-memory
/// store rather than keeping the service down.
async fn build_store(storage: &StorageConfig) -> Arc<dyn CounterStore> {
    let memory = || -> Arc<dyn CounterStore> {
        Arc::new(BoundedMemoryCounterStore::new(storage.max_entries))
    };

    match (storage.backend, storage.redis_url.as_deref()) {
        (StorageBackend::Persistent, Some(url)) => {
            match RedisCache::connect(url, storage.connect_timeout()).await {
                Ok(cache) => {
                    info!(timeout_ms = storage.timeout_ms, "Using persistent counter store");
                    let store = PersistentCounterStore::new(Arc::new(cache))
                        .with_timeout(storage.timeout());
                    Arc::new(store)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        max_entries = storage.max_entries,
                        "Persistent counter store unreachable, falling back to in-memory store"
                    );
                    memory()
                }
            }
        }
        _ => {
            info!(max_entries = storage.max_entries, "Using in-memory counter store");
            memory()
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
