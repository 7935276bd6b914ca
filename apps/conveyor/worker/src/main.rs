//! Worker Daemon - Entry Point
//!
//! Pulls jobs from the queue backend and executes registered handlers.

use conveyor_worker::handlers::EchoHandler;
use std::sync::Arc;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    conveyor_worker::run_with_handlers(vec![Arc::new(EchoHandler)]).await
}
