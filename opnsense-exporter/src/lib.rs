//! Prometheus exporter for OPNsense gateway status.
//!
//! Every scrape of `/metrics` polls the appliance's gateway status API once
//! and translates the result into four gauge families per gateway: status,
//! packet loss, delay and delay standard deviation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │    OPNsense     │<────│    Collector    │<────│   HTTP Server   │
//! │ (gateway/status)│────>│ (decode/normal.)│────>│   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! API_URL=https://192.168.1.1 API_KEY=... API_SECRET=... opnsense-exporter
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod mapping;

pub use client::{FetchError, GatewayClient};
pub use collector::{GatewayCollector, SharedCollector};
pub use config::{ConfigOverrides, ExporterConfig, LogFormat, LoggingConfig};
pub use error::CollectError;
pub use http::HttpServer;

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}
