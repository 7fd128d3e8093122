//! # roomsync server
//!
//! Durable shared-state rooms over WebSockets.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! roomsync
//!
//! # Run with environment variables
//! ROOMSYNC_PORT=8080 ROOMSYNC_HOST=0.0.0.0 roomsync
//! ```
//!
//! Configuration is read from `roomsync.toml` if present (see
//! [`config::Config`] for the search paths).

mod config;
mod handlers;
mod locator;
mod metrics;
mod reducer;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomsync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting roomsync server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
