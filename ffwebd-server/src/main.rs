//! ffwebd – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing.
//! 3. Initialise the transcoder driver (binary check + temp root).
//! 4. Start the task manager (dispatch loop + artifact reaper).
//! 5. Build the axum router and serve until a shutdown signal.

mod config;
mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use ffwebd_core::{FfmpegDriver, Manager, TranscodeRunner};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cfg.log_level.parse().unwrap_or_default()),
        )
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "ffwebd starting");

    // ── 3. Transcoder driver ───────────────────────────────────────────────────
    let driver =
        Arc::new(FfmpegDriver::new(cfg.driver_config()).context("failed to initialise driver")?);

    // ── 4. Shutdown signal ─────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
        // Hold the sender so receivers keep observing a live channel
        // while the server drains.
        std::future::pending::<()>().await;
    });

    // ── 5. Task manager ────────────────────────────────────────────────────────
    let manager = Manager::start(
        cfg.manager_config(),
        Arc::clone(&driver) as Arc<dyn TranscodeRunner>,
        shutdown_rx.clone(),
    );

    // ── 6. HTTP server ─────────────────────────────────────────────────────────
    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        manager,
    });
    let app = routes::build(state);

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "HTTP server listening");

    let mut drain_rx = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*drain_rx.borrow() {
                if drain_rx.changed().await.is_err() {
                    warn!("shutdown channel closed unexpectedly");
                    break;
                }
            }
        })
        .await?;

    info!("server exiting");
    Ok(())
}

/// Completes on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
