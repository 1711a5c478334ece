//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::collector::SharedCollector;
use crate::config::ScrapeErrorPolicy;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    collector: SharedCollector,
    on_error: ScrapeErrorPolicy,
}

/// Create the HTTP router.
fn create_router(
    collector: SharedCollector,
    metrics_path: &str,
    on_error: ScrapeErrorPolicy,
) -> Router {
    let state = AppState {
        collector,
        on_error,
    };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint. Each request polls the appliance.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.collector.scrape().await {
        Ok(body) => (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response(),
        Err(e) => match state.on_error {
            ScrapeErrorPolicy::Empty => {
                (StatusCode::OK, [("content-type", CONTENT_TYPE)], "").into_response()
            }
            ScrapeErrorPolicy::Status => {
                (StatusCode::BAD_GATEWAY, format!("{}\n", e)).into_response()
            }
        },
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint.
async fn ready_handler(State(state): State<AppState>) -> Response {
    match state.collector.stats().last_error {
        None => (StatusCode::OK, "ready\n").into_response(),
        Some(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("not ready - last collection failed: {}\n", error),
        )
            .into_response(),
    }
}

/// HTTP server configuration.
pub struct HttpServer {
    collector: SharedCollector,
    listen_addr: SocketAddr,
    metrics_path: String,
    on_error: ScrapeErrorPolicy,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(
        collector: SharedCollector,
        listen_addr: SocketAddr,
        metrics_path: String,
        on_error: ScrapeErrorPolicy,
    ) -> Self {
        Self {
            collector,
            listen_addr,
            metrics_path,
            on_error,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    ///
    /// Fails immediately if the listen address cannot be bound.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.collector, &self.metrics_path, self.on_error);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
