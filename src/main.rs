//! entityflow: workflow descriptor validator and interpreter
//!
//! Main entry point. Loads configuration from the environment and starts the
//! HTTP server.

use entityflow::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Workflow descriptor management at /api/workflows/*
/// - Entity lifecycle endpoints at /api/entities/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
