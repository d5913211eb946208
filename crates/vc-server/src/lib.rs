//! vc-server: HTTP surface and conversion job engine.
//!
//! Ties `vc-core` and `vc-av` together into a running service:
//!
//! - Axum API for upload, progress polling, download and health
//! - In-memory job registry and background orchestrator
//! - Optional retention sweeper for finished jobs
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod housekeeping;
pub mod middleware;
pub mod orchestrator;
pub mod registry;
pub mod router;
pub mod routes;
pub mod storage;

use std::net::SocketAddr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vc_av::ToolRegistry;
use vc_core::config::Config;

use crate::context::AppContext;

/// Start the conversion server.
///
/// Discovers external tools, builds the [`AppContext`] and serves HTTP until
/// a shutdown signal arrives. Running encodes are cancelled and awaited
/// before returning.
pub async fn start(config: Config) -> vc_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let tools = discover_tools(&config).await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| vc_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::new(config, tools)?;

    let sweeper = ctx.config.storage.retention_secs.map(|secs| {
        tokio::spawn(housekeeping::run_sweeper(
            ctx.registry.clone(),
            Duration::from_secs(secs),
            housekeeping::SWEEP_INTERVAL,
            ctx.cancel.clone(),
        ))
    });

    let app = router::build_router(ctx.clone());

    tracing::info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| vc_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(ctx.cancel.clone()))
        .await;

    ctx.orchestrator.shutdown().await;
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }

    served.map_err(|e| vc_core::Error::Internal(format!("Server error: {e}")))?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Discover tools and log what was found. Version detection runs each
/// binary synchronously, so it happens on the blocking pool.
async fn discover_tools(config: &Config) -> vc_core::Result<ToolRegistry> {
    let tools_config = config.tools.clone();
    tokio::task::spawn_blocking(move || {
        let tools = ToolRegistry::discover(&tools_config);
        for info in tools.check_all() {
            if info.available {
                tracing::info!(
                    "Tool found: {} ({})",
                    info.name,
                    info.version.as_deref().unwrap_or("unknown version")
                );
            } else {
                tracing::warn!("Tool not found: {}", info.name);
            }
        }
        tools
    })
    .await
    .map_err(|e| vc_core::Error::Internal(format!("tool discovery failed: {e}")))
}

/// Wait for SIGINT, SIGTERM or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
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
