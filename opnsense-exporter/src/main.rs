//! Prometheus exporter for OPNsense gateway status.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use opnsense_exporter::{
    ConfigOverrides, ExporterConfig, GatewayCollector, HttpServer, init_tracing,
};

/// Prometheus exporter for OPNsense gateway status.
#[derive(Parser, Debug)]
#[command(name = "opnsense-exporter")]
#[command(about = "Export OPNsense gateway status as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Appliance base URL, e.g. https://192.168.1.1.
    #[arg(long, env = "API_URL")]
    api_url: Option<String>,

    /// API key (HTTP Basic username).
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API secret (HTTP Basic password).
    #[arg(long, env = "API_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ExporterConfig::load(
        args.config.as_deref(),
        ConfigOverrides {
            api_url: args.api_url,
            api_key: args.api_key,
            api_secret: args.api_secret,
            listen: args.listen,
            log_level: args.log_level,
        },
    )?;

    init_tracing(&config.logging)?;

    info!("Starting OPNsense exporter");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let collector = Arc::new(GatewayCollector::from_config(&config)?);

    let listen_addr: SocketAddr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    info!(
        upstream = %collector.upstream_url(),
        timeout_ms = config.opnsense.timeout_ms,
        stddev_mode = ?config.prometheus.stddev_mode,
        on_error = ?config.prometheus.on_error,
        metrics = ?collector.metrics().descriptors().map(|d| d.name.as_str()),
        "Polling gateway status on each scrape"
    );

    let http_server = HttpServer::new(
        collector.clone(),
        listen_addr,
        config.prometheus.path.clone(),
        config.prometheus.on_error,
    );

    let mut http_task = tokio::spawn(async move { http_server.run(shutdown_rx).await });

    tokio::select! {
        result = &mut http_task => {
            // The server only returns on its own when it failed to start.
            match result {
                Ok(Ok(())) => info!("HTTP server exited"),
                Ok(Err(e)) => {
                    error!("HTTP server error: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("HTTP server task failed: {}", e);
                    return Err(e.into());
                }
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        error!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    let stats = collector.stats();
    info!(
        scrapes_total = stats.scrapes_total,
        scrape_failures = stats.scrape_failures,
        gateways_filtered = stats.gateways_filtered,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}
