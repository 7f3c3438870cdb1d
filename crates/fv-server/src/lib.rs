//! fv-server: HTTP film streaming server.
//!
//! This crate ties together the other fv-* crates into a running server
//! application. It provides:
//!
//! - Axum routes for direct (range-capable) and transcoded film streams
//! - A single-flight duration cache for seek approximation
//! - A background sweeper that reports leaked descriptors and processes
//! - Graceful shutdown via signal handling

pub mod context;
pub mod duration_cache;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod streaming;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio_util::sync::CancellationToken;

use fv_core::config::Config;

use crate::context::AppContext;

/// Start the filmvault server.
///
/// Opens the catalog, discovers tools, builds the [`AppContext`] and serves
/// HTTP until a shutdown signal arrives.
pub async fn start(config: Config, config_path: Option<PathBuf>) -> fv_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }
    if let Some(path) = &config_path {
        tracing::info!("Configuration loaded from {}", path.display());
    }

    let tools = Arc::new(fv_av::ToolRegistry::discover(&config.tools));
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}; transcoding will fail", info.name);
        }
    }

    let catalog = fv_db::open_catalog(&config.catalog)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| fv_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::new(config, catalog, tools);

    let cancel = CancellationToken::new();

    let maintenance_handle = tokio::spawn(run_maintenance(ctx.clone(), cancel.clone()));

    let app = router::build_router(ctx.clone());

    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| fv_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    run_accept_loop(listener, app, cancel.clone()).await;

    cancel.cancel();
    let _ = maintenance_handle.await;

    let leftover = ctx.registry.len();
    if leftover > 0 {
        tracing::warn!(open = leftover, "Shutting down with streams still open");
    }
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Periodic registry sweep plus duration cache expiry.
async fn run_maintenance(ctx: AppContext, cancel: CancellationToken) {
    let sweeper = fv_media::registry::run_sweeper(
        Arc::clone(&ctx.registry),
        ctx.config.registry.clone(),
        cancel.clone(),
    );

    let durations = Arc::clone(&ctx.durations);
    let purge_every = Duration::from_secs(ctx.config.streaming.duration_ttl_secs.max(60));
    let purger = async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + purge_every, purge_every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = durations.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, "Expired duration entries purged");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    };

    tokio::join!(sweeper, purger);
}

/// Serve `app` on `listener` until `cancel` fires or a shutdown signal
/// arrives. In-flight connections are left to finish on their own tasks.
pub async fn run_accept_loop(
    listener: tokio::net::TcpListener,
    app: Router,
    cancel: CancellationToken,
) {
    let shutdown = shutdown_signal(cancel);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        tokio::spawn(handle_connection(stream, app.clone()));
                    }
                    Err(e) => {
                        tracing::debug!("Accept error: {e}");
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, app: Router) {
    let io = TokioIo::new(stream);
    let hyper_service = TowerToHyperService::new(app.into_service());
    if let Err(e) = hyper::server::conn::http1::Builder::new()
        .serve_connection(io, hyper_service)
        .with_upgrades()
        .await
    {
        // Clients drop video connections mid-body all the time.
        tracing::debug!("Hyper connection error: {e}");
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
