//! Admin API Service
//!
//! HTTP surface for the work queue control plane:
//! - Simulations: run the queueing model against a (policy, traffic) pair
//!   and read back metrics, timelines, and chart series
//! - Policy changes: staged `proposed -> approved -> applied` rollout with
//!   audit and rollback
//! - Presets: named policy and traffic starting points
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum) ──> SimulationStore / PolicyChangeManager (policy-sim)
//!                        │
//!                  PolicyStore (watch-published versions)
//! ```

pub mod api;
pub mod state;

use axum_helpers::shutdown_signal;
use core_config::server::ServerConfig;
use core_config::{app_info, Environment, FromEnv};
use eyre::{Result, WrapErr};
use state::AppState;
use tokio::net::TcpListener;
use tracing::info;

/// Run the admin API server.
///
/// # Errors
///
/// Returns an error if the server configuration is invalid or the listener
/// cannot bind.
pub async fn run() -> Result<()> {
    // Initialize tracing (env-aware: JSON for prod, pretty for dev)
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    // Initialize Prometheus metrics
    observability::init_metrics();

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting admin API");

    let server_config = ServerConfig::from_env().wrap_err("Failed to load server configuration")?;
    let state = AppState::new();
    let app = api::router(state, app_info);

    let listener = TcpListener::bind(server_config.bind_addr())
        .await
        .wrap_err_with(|| format!("Failed to bind to {}", server_config.bind_addr()))?;
    info!(addr = %server_config.bind_addr(), "Admin API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Admin API server failed")?;

    Ok(())
}
