//! HTTP client for the OPNsense gateway status API.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::OpnsenseConfig;

/// API path of the gateway status endpoint, relative to the appliance URL.
pub const GATEWAY_STATUS_PATH: &str = "/api/routes/gateway/status";

/// Errors raised while talking to the appliance.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
    #[error("Non-200 status code: {0}")]
    Status(StatusCode),
}

/// Authenticated client for a single appliance.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    api_secret: String,
}

impl GatewayClient {
    /// Create a client from the connection settings.
    pub fn new(config: &OpnsenseConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            http,
            url: gateway_status_url(&config.url),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    /// Full URL of the gateway status endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the raw gateway status body.
    ///
    /// Any status other than 200 is an error; the body is only returned on
    /// success. Dropping the returned future aborts the request.
    pub async fn fetch_gateway_status(&self) -> Result<Vec<u8>, FetchError> {
        trace!(url = %self.url, "Fetching gateway status");

        let response = self
            .http
            .get(&self.url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await.map_err(FetchError::Body)?;
        debug!(bytes = body.len(), "Received gateway status");

        Ok(body.to_vec())
    }
}

/// Join the appliance base URL with [`GATEWAY_STATUS_PATH`].
pub fn gateway_status_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), GATEWAY_STATUS_PATH)
}
