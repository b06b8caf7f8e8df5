//! Write-Back Cache - HTTP service
//!
//! Serves `users` through the write-back cache, with SQLite as the system
//! of record and an in-memory cache store as the fast path.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use writeback_cache::api::{create_router, AppState};
use writeback_cache::models::CREATE_USERS_TABLE;
use writeback_cache::store::{DurableStore, MemoryCacheStore, SqliteStore};
use writeback_cache::{Config, WriteBackCache};

/// Main entry point for the write-back cache service.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect the durable store and make sure the `users` table exists
/// 4. Create the in-memory cache store and the cache manager
/// 5. Start the HTTP server on the configured port
/// 6. On SIGINT/SIGTERM stop serving and write back every pending update
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "writeback_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting write-back cache service");

    let config = Config::from_env();
    info!(
        "Configuration loaded: database={}, default_evict={}s, default_flush={}s, max_entries={}, port={}",
        config.database_url,
        config.default_evict_secs,
        config.default_flush_secs,
        config.max_entries,
        config.server_port
    );

    let durable = SqliteStore::connect(&config.database_url)
        .await
        .context("failed to open durable store")?;
    durable
        .execute(CREATE_USERS_TABLE)
        .await
        .context("failed to prepare users table")?;
    info!("Durable store ready");

    let cache = WriteBackCache::from_config(
        Arc::new(MemoryCacheStore::new(config.max_entries)),
        Arc::new(durable),
        &config,
    );
    let app = create_router(AppState::new(cache.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let flushed = cache.flush_pending().await;
    let failed = cache.failed_flushes().len();
    if failed > 0 {
        warn!("{} durable writes failed during this run", failed);
    }
    info!("Shutdown complete, {} pending writes persisted", flushed);
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
