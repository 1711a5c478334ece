//! Scrape-time collection: fetch, decode, filter, normalize, render.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::client::{FetchError, GatewayClient};
use crate::config::{ExporterConfig, FilterConfig};
use crate::error::Result;
use crate::gateway::{self, GatewayRecord, NormalizedGateway};
use crate::mapping::{GatewayMetrics, render};

/// Filter for gateway records, matched on the gateway name.
pub struct GatewayFilter {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
}

impl GatewayFilter {
    /// Create a new filter from configuration. Invalid patterns are skipped.
    pub fn new(config: &FilterConfig) -> Self {
        let include = config
            .include_gateways
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        let exclude = config
            .exclude_gateways
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        Self { include, exclude }
    }

    /// Check if a gateway should be exported.
    pub fn should_include(&self, record: &GatewayRecord) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(&record.name)) {
            return false;
        }
        !self.exclude.iter().any(|p| p.matches(&record.name))
    }
}

impl Default for GatewayFilter {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}

/// Collector statistics.
#[derive(Debug, Clone, Default)]
pub struct CollectorStats {
    /// Collections attempted.
    pub scrapes_total: u64,
    /// Collections that failed at any stage.
    pub scrape_failures: u64,
    /// Gateways exported by the most recent successful collection.
    pub gateways_last_scrape: usize,
    /// Records skipped by the gateway filter, across all collections.
    pub gateways_filtered: u64,
    /// Error of the most recent collection, cleared on success.
    pub last_error: Option<String>,
}

/// Runs the gateway pipeline for each scrape.
///
/// Holds no per-scrape state: every call fetches fresh data. The statistics
/// are diagnostic only and never influence the output.
pub struct GatewayCollector {
    client: GatewayClient,
    metrics: GatewayMetrics,
    filter: GatewayFilter,
    stats: RwLock<CollectorStats>,
}

impl GatewayCollector {
    /// Create a new collector.
    pub fn new(client: GatewayClient, metrics: GatewayMetrics, filter: GatewayFilter) -> Self {
        Self {
            client,
            metrics,
            filter,
            stats: RwLock::new(CollectorStats::default()),
        }
    }

    /// Build the client, descriptors and filter from configuration.
    pub fn from_config(config: &ExporterConfig) -> std::result::Result<Self, FetchError> {
        let client = GatewayClient::new(&config.opnsense)?;
        let metrics = GatewayMetrics::new(
            &config.prometheus.prefix,
            config.prometheus.stddev_mode,
            &config.prometheus.default_labels,
        );
        let filter = GatewayFilter::new(&config.filters);

        Ok(Self::new(client, metrics, filter))
    }

    /// Metric descriptors used by this collector.
    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    /// Upstream endpoint polled on each scrape.
    pub fn upstream_url(&self) -> &str {
        self.client.url()
    }

    /// Fetch, decode, filter and normalize the current gateway status.
    ///
    /// Fails as a whole if any selected record cannot be normalized.
    pub async fn collect(&self) -> Result<Vec<NormalizedGateway>> {
        let body = self.client.fetch_gateway_status().await?;
        let response = gateway::decode(&body)?;

        trace!(
            status = %response.status,
            items = response.items.len(),
            "Decoded gateway status"
        );

        let selected: Vec<&GatewayRecord> = response
            .items
            .iter()
            .filter(|record| self.filter.should_include(record))
            .collect();
        let filtered = response.items.len() - selected.len();
        if filtered > 0 {
            self.stats.write().gateways_filtered += filtered as u64;
        }

        Ok(gateway::normalize_all(selected)?)
    }

    /// Run one collection and render it in exposition format.
    ///
    /// Errors are logged here and returned so the HTTP layer can choose the
    /// response.
    pub async fn scrape(&self) -> Result<String> {
        self.stats.write().scrapes_total += 1;

        match self.collect().await {
            Ok(gateways) => {
                let body = render(&self.metrics.emit(&gateways));
                debug!(gateways = gateways.len(), "Collected gateway status");

                let mut stats = self.stats.write();
                stats.gateways_last_scrape = gateways.len();
                stats.last_error = None;
                Ok(body)
            }
            Err(e) => {
                warn!(stage = e.stage(), error = %e, "Error getting gateway status");

                let mut stats = self.stats.write();
                stats.scrape_failures += 1;
                stats.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Get collector statistics.
    pub fn stats(&self) -> CollectorStats {
        self.stats.read().clone()
    }
}

/// Create a shareable collector handle.
pub type SharedCollector = Arc<GatewayCollector>;
