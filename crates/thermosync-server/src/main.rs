//! # Thermosync Server
//!
//! Realtime broadcast hub: every message a client sends is relayed to every
//! connected client.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (ws://127.0.0.1:3000/ws)
//! thermosync
//!
//! # Run with a specific config file
//! THERMOSYNC_CONFIG=/path/to/thermosync.toml thermosync
//!
//! # Run with environment overrides
//! THERMOSYNC_PORT=8080 THERMOSYNC_HOST=0.0.0.0 thermosync
//! THERMOSYNC_BROADCAST__WRITE_TIMEOUT_MS=500 thermosync
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thermosync=debug,thermosync_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Thermosync server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
