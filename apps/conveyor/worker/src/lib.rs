//! Worker Daemon
//!
//! A background process that reserves jobs from the queue backend and runs
//! registered handlers with bounded concurrency.
//!
//! ## Architecture
//!
//! ```text
//! Redis (list or stream provider)
//!   ↓ reserve / heartbeat / ack / nack
//! WorkerRuntime (queue-worker)
//!   ↓ dispatch by job_type
//! JobHandler implementations
//!
//! side tasks: Reaper (reclaim), OutboxRelay (when DATABASE_URL is set),
//! admin HTTP server (health, readiness, queue stats, DLQ admin, metrics)
//! ```
//!
//! ## Environment
//!
//! - `REDIS_URL` (required) - store connection
//! - `BACKEND_KIND` - `list` (default) or `stream`
//! - `WORKER_QUEUES` - comma-separated queue names (default `default`)
//! - `WORKER_CONCURRENCY` - executor permits (default 4)
//! - `WORKER_HEALTH_PORT` / `HEALTH_PORT` - admin server port (default 8082)
//! - `DATABASE_URL` - enables the outbox relay when set

pub mod admin;
pub mod handlers;

use axum_helpers::ShutdownCoordinator;
use core_config::redis::RedisConfig;
use core_config::{app_info, env_or_default, env_parse_or, Environment, FromEnv};
use delivery::{OutboxRelay, PgOutboxRepository, RedisDedupStore, RelayConfig};
use eyre::{Result, WrapErr};
use queue_backend::{
    connect_with_retry, BackendKind, ListBackend, QueueBackend, QueueConfig, Reaper, StreamBackend,
};
use queue_worker::{DlqManager, JobHandler, QueueSelector, WorkerConfig, WorkerRuntime};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Run the worker daemon with the given handlers.
///
/// This is the main entry point. It:
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Connects to Redis with retry and builds the configured backend
/// 3. Starts the reaper, the optional outbox relay, and the admin server
/// 4. Runs the worker runtime until SIGTERM/SIGINT, then drains
///
/// # Errors
///
/// Returns an error if configuration is invalid, Redis is unreachable, or
/// the runtime fails fatally.
pub async fn run_with_handlers(handlers: Vec<Arc<dyn JobHandler>>) -> Result<()> {
    // Initialize tracing (env-aware: JSON for prod, pretty for dev)
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    // Initialize Prometheus metrics
    observability::init_metrics();

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting worker daemon");

    // Admin server port (WORKER_HEALTH_PORT, then HEALTH_PORT, then 8082)
    let health_port: u16 = std::env::var("WORKER_HEALTH_PORT")
        .or_else(|_| std::env::var("HEALTH_PORT"))
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(8082);

    // Connect to Redis with retry logic
    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    info!("Connecting to Redis...");
    let redis = connect_with_retry(&redis_config.url, None)
        .await
        .wrap_err("Failed to connect to Redis")?;
    info!("Connected to Redis successfully");

    // Build the configured backend
    let kind: BackendKind = env_or_default("BACKEND_KIND", "list")
        .parse()
        .map_err(|e: String| eyre::eyre!(e))?;
    let backend: Arc<dyn QueueBackend> = match kind {
        BackendKind::List => Arc::new(ListBackend::new("primary", redis.clone())),
        BackendKind::Stream => Arc::new(StreamBackend::new("primary", redis.clone())),
        BackendKind::Memory => {
            return Err(eyre::eyre!("the memory backend is for tests; pick list or stream"))
        }
    };
    info!(backend = kind.as_str(), "Backend ready");

    // Make sure the consumed queues exist with at least default settings
    let queues: Vec<String> = env_or_default("WORKER_QUEUES", "default")
        .split(',')
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    for queue in &queues {
        if backend.queue_config(queue).await.is_err() {
            backend
                .configure_queue(QueueConfig::new(queue))
                .await
                .wrap_err_with(|| format!("Failed to configure queue '{}'", queue))?;
        }
    }

    let concurrency: usize = env_parse_or("WORKER_CONCURRENCY", 4)
        .wrap_err("Invalid WORKER_CONCURRENCY")?;
    let worker_config = WorkerConfig::new(QueueSelector::ByName(queues.clone()))
        .with_max_concurrency(concurrency);
    info!(
        consumer_id = %worker_config.consumer_id,
        queues = ?queues,
        max_concurrency = concurrency,
        "Worker configuration loaded"
    );

    let mut runtime = WorkerRuntime::new(backend.clone(), worker_config);
    for handler in handlers {
        info!(job_type = handler.job_type(), "Registered handler");
        runtime.register_handler(handler);
    }

    // Shutdown plumbing: signals fan out to every subsystem
    let (coordinator, _) = ShutdownCoordinator::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        coordinator.wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // Reaper re-delivers expired reservations
    let reaper = Reaper::new(backend.clone());
    {
        let reaper_shutdown = shutdown_rx.clone();
        tokio::spawn(async move { reaper.run(reaper_shutdown).await });
    }

    // Outbox relay, when a database is configured
    if std::env::var("DATABASE_URL").is_ok() {
        let db_config = core_config::database::DatabaseConfig::from_env()
            .wrap_err("Failed to load database configuration")?;
        info!("Connecting to PostgreSQL for the outbox relay...");
        let db = sea_orm::Database::connect(&db_config.url)
            .await
            .wrap_err("Failed to connect to PostgreSQL")?;
        info!("Connected to PostgreSQL successfully");

        use migration::MigratorTrait;
        migration::Migrator::up(&db, None)
            .await
            .wrap_err("Failed to apply outbox migrations")?;

        let relay = OutboxRelay::new(
            Arc::new(PgOutboxRepository::new(db)),
            Arc::new(RedisDedupStore::new(redis.clone())),
            backend.clone(),
            RelayConfig::default(),
        );
        let relay_shutdown = shutdown_rx.clone();
        tokio::spawn(async move { relay.run(relay_shutdown).await });
    }

    // Admin HTTP server (health, readiness, queue stats, DLQ admin, metrics)
    let admin_state = admin::AdminState {
        backend: backend.clone(),
        dlq: Arc::new(DlqManager::new(backend.clone())),
        redis: redis.clone(),
        app_name: app_info.name,
        app_version: app_info.version,
    };
    tokio::spawn(async move {
        if let Err(e) = serve_admin(admin_state, health_port).await {
            error!(error = %e, "Admin server failed");
        }
    });

    // Run the worker until the shutdown signal flips, then drain
    info!("Starting worker runtime...");
    runtime
        .run(shutdown_rx)
        .await
        .map_err(|e| eyre::eyre!("{}", e))?;

    info!("Worker daemon stopped");
    Ok(())
}

async fn serve_admin(state: admin::AdminState, port: u16) -> Result<()> {
    let app = admin::router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind admin server to {}", addr))?;

    info!(port = port, "Admin server listening");
    axum::serve(listener, app).await.wrap_err("Admin server failed")?;
    Ok(())
}
