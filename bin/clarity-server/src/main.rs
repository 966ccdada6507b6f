//! clarity-server: entry point.
//!
//! Startup order:
//! 1. Parse the command line and configuration from environment variables.
//! 2. Initialise tracing (JSON or pretty console, optional rolling file).
//! 3. Open the database and run migrations.
//! 4. Wire the analysis / retrieval / generation pipeline.
//! 5. Run an offline job, or serve HTTP + WebSocket until SIGINT/SIGTERM.

mod commands;
mod config;
mod entities;
mod error;
mod logging;
mod middleware;
mod routes;
mod schemas;
mod services;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use crate::commands::{Cli, Command};
use crate::config::Config;
use crate::entities::AnyStore;
use crate::services::AuthClient;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Command line + configuration ────────────────────────────────────────
    let cli = Cli::parse();
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let _log_guard = logging::init(&cfg)?;
    info!(version = env!("CARGO_PKG_VERSION"), "clarity-server starting");

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = AnyStore::connect(&cfg.database_url, cfg.db_max_connections).await?;
    let backend = cfg.database_url.split(':').next().unwrap_or_default();
    info!(backend, "database ready");

    // ── 4. Pipeline ────────────────────────────────────────────────────────────
    let therapy = commands::build_service(&cfg, store).await?;
    info!(llm = therapy.llm_configured(), "pipeline ready");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg, therapy).await,
        command => commands::run(command, &therapy).await,
    }
}

async fn serve(cfg: Config, therapy: services::TherapyService) -> anyhow::Result<()> {
    // ── 5. Shared application state ────────────────────────────────────────────
    let auth = AuthClient::from_config(&cfg);
    if !auth.is_configured() {
        warn!("SUPABASE_URL not set; /api/v1/auth endpoints will return 503");
    }
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let state = Arc::new(AppState::new(cfg, therapy, auth));

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("clarity-server stopped");
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
