//! # Anycache - Main Entry Point
//!
//! Startup sequence: initialize logging, resolve configuration (fail fast
//! on any configuration error), construct the selected storage backend,
//! wire the cache engine into the intercept hook, and serve until a
//! shutdown signal arrives.

use std::sync::Arc;
use tracing::{error, info, warn};

use anycache::cache::{build_store, CacheEngine};
use anycache::core::config::{AnycacheConfig, BackendHandle};
use anycache::core::error::AnycacheResult;
use anycache::proxy::{InterceptHook, ProxyServer};

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        error!("anycache failed to start: {}", e);
        std::process::exit(1);
    }

    info!("anycache shutdown complete");
}

async fn run() -> AnycacheResult<()> {
    info!("🚀 Starting anycache v{}", env!("CARGO_PKG_VERSION"));

    // Configuration errors are fatal; a proxy running with a backend it
    // cannot reach at startup would cache nothing silently
    let config = AnycacheConfig::load().await?;
    let handle = BackendHandle::resolve(&config)?;

    info!(
        backend = handle.uri.name(),
        ttl = ?handle.default_ttl,
        listen = %config.listen_addr,
        "configuration resolved"
    );

    let store = build_store(&handle).await?;
    match store.health_check().await {
        Ok(true) => info!(backend = store.name(), "backend healthy"),
        Ok(false) | Err(_) => {
            warn!(backend = store.name(), "backend health check failed, continuing degraded")
        }
    }

    let engine = CacheEngine::new(store, config.policy.clone(), &handle);
    let hook = Arc::new(InterceptHook::new(Arc::new(engine)));

    ProxyServer::new(&config, hook)?.run().await
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anycache=info".into()),
        )
        .init();
}
