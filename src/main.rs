//! Dedicated Control - session controller for a dedicated game server
//!
//! The engine launches this process and talks to it over stdin/stdout.
//! The controller handles:
//! - Lobby policy: auto start, team balancing, ping limits
//! - Admin and user chat commands
//! - Votes on kicks, mutes and the next preset
//! - Preset rotation and the kill ranking
//!
//! Logs go to stderr since stdout carries the engine protocol.

mod app;
mod commands;
mod config;
mod engine;
mod game;
mod rotation;
mod session;
mod store;
mod util;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::util::time::{init_server_time, uptime_secs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Dedicated Control");
    info!(
        presets = ?config.policy.presets,
        lobby_port = ?config.lobby_port,
        "Session settings"
    );

    let lobby_port = config.lobby_port;
    let global_settings = config.global_settings.clone();

    // Create application state
    let state = AppState::load(config).await?;
    let mut controller = state.into_controller(engine::link::stdio());

    controller.start(lobby_port, &global_settings).await?;

    tokio::select! {
        result = controller.run() => {
            if let Err(e) = result {
                error!(error = %e, "Session ended with error");
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {}
    }

    info!(uptime_secs = uptime_secs(), "Dedicated Control shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
