//! Admin API - Entry Point
//!
//! HTTP surface for simulations, policy changes, and presets.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    conveyor_api::run().await
}
