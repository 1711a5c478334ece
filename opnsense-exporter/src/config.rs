//! Configuration for the OPNsense exporter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Appliance API settings.
    #[serde(default)]
    pub opnsense: OpnsenseConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Gateway filtering settings.
    #[serde(default)]
    pub filters: FilterConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// OPNsense API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpnsenseConfig {
    /// Appliance base URL, e.g. "https://192.168.1.1".
    #[serde(default)]
    pub url: String,

    /// API key (HTTP Basic username).
    #[serde(default)]
    pub api_key: String,

    /// API secret (HTTP Basic password).
    #[serde(default)]
    pub api_secret: String,

    /// Upstream request timeout in milliseconds (default: 5000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Accept invalid TLS certificates (self-signed appliance certs).
    #[serde(default)]
    pub insecure: bool,
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for OpnsenseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            timeout_ms: default_timeout_ms(),
            insecure: false,
        }
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Constant labels added to every series.
    #[serde(default)]
    pub default_labels: HashMap<String, String>,

    /// Metric name prefix (default: "opnsense").
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// What the metrics endpoint returns when a collection fails.
    #[serde(default)]
    pub on_error: ScrapeErrorPolicy,

    /// Labels and value used for the stddev series.
    #[serde(default)]
    pub stddev_mode: StddevMode,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "opnsense".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            default_labels: HashMap::new(),
            prefix: default_prefix(),
            on_error: ScrapeErrorPolicy::default(),
            stddev_mode: StddevMode::default(),
        }
    }
}

/// Response policy for a failed collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeErrorPolicy {
    /// HTTP 200 with an empty body.
    #[default]
    Empty,
    /// HTTP 502 with the error message.
    Status,
}

/// How the stddev series is labelled and valued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StddevMode {
    /// Labels `gateway, address`; value is the latency standard deviation.
    #[default]
    Stddev,
    /// Labels `gateway, stddev` (carrying the address); value is the delay.
    /// Matches dashboards built against the Go exporter.
    Legacy,
}

/// Gateway filtering configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Glob patterns for gateway names to include (empty = all).
    #[serde(default)]
    pub include_gateways: Vec<String>,

    /// Glob patterns for gateway names to exclude.
    #[serde(default)]
    pub exclude_gateways: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Values supplied on the command line or through the environment.
///
/// Each `Some` replaces the corresponding file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub listen: Option<String>,
    pub log_level: Option<String>,
}

impl ExporterConfig {
    /// Build the effective configuration: optional JSON5 file, then overrides,
    /// then validation.
    pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                json5::from_str(&content)?
            }
            None => ExporterConfig::default(),
        };
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace file values with the ones that were explicitly provided.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.api_url {
            self.opnsense.url = url;
        }
        if let Some(key) = overrides.api_key {
            self.opnsense.api_key = key;
        }
        if let Some(secret) = overrides.api_secret {
            self.opnsense.api_secret = secret;
        }
        if let Some(listen) = overrides.listen {
            self.prometheus.listen = listen;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.opnsense.url.is_empty() {
            return Err(ConfigError::Validation(
                "API URL is required (opnsense.url or API_URL)".to_string(),
            ));
        }

        if !self.opnsense.url.starts_with("http://") && !self.opnsense.url.starts_with("https://")
        {
            return Err(ConfigError::Validation(format!(
                "API URL must start with http:// or https://: {}",
                self.opnsense.url
            )));
        }

        if self.opnsense.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "timeout_ms must be > 0".to_string(),
            ));
        }

        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        let path = self.prometheus.path.as_str();
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if path == "/health" || path == "/ready" {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} is already served by the exporter",
                path
            )));
        }

        if path.contains([':', '*']) {
            return Err(ConfigError::Validation(format!(
                "Metrics path must be a literal path without ':' or '*': {}",
                path
            )));
        }

        for pattern in self
            .filters
            .include_gateways
            .iter()
            .chain(&self.filters.exclude_gateways)
        {
            glob::Pattern::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("Invalid gateway pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{ opnsense: { url: "https://fw.example.net" } }"#;
        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.opnsense.url, "https://fw.example.net");
        assert_eq!(config.opnsense.timeout_ms, 5000);
        assert!(!config.opnsense.insecure);
        assert_eq!(config.prometheus.listen, "0.0.0.0:8080");
        assert_eq!(config.prometheus.path, "/metrics");
        assert_eq!(config.prometheus.prefix, "opnsense");
        assert_eq!(config.prometheus.on_error, ScrapeErrorPolicy::Empty);
        assert_eq!(config.prometheus.stddev_mode, StddevMode::Stddev);
        assert!(config.filters.include_gateways.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            opnsense: {
                url: "https://10.0.0.1",
                api_key: "key",
                api_secret: "secret",
                timeout_ms: 2500,
                insecure: true
            },
            prometheus: {
                listen: "127.0.0.1:9100",
                path: "/opnsense/metrics",
                prefix: "fw",
                default_labels: {
                    site: "home"
                },
                on_error: "status",
                stddev_mode: "legacy"
            },
            filters: {
                include_gateways: ["WAN*"],
                exclude_gateways: ["*_DHCP6"]
            },
            logging: {
                level: "debug",
                format: "json"
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.opnsense.api_key, "key");
        assert_eq!(config.opnsense.api_secret, "secret");
        assert_eq!(config.opnsense.timeout_ms, 2500);
        assert!(config.opnsense.insecure);
        assert_eq!(config.prometheus.listen, "127.0.0.1:9100");
        assert_eq!(config.prometheus.path, "/opnsense/metrics");
        assert_eq!(config.prometheus.prefix, "fw");
        assert_eq!(
            config.prometheus.default_labels.get("site"),
            Some(&"home".to_string())
        );
        assert_eq!(config.prometheus.on_error, ScrapeErrorPolicy::Status);
        assert_eq!(config.prometheus.stddev_mode, StddevMode::Legacy);
        assert_eq!(config.filters.include_gateways, vec!["WAN*"]);
        assert_eq!(config.filters.exclude_gateways, vec!["*_DHCP6"]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validate_missing_url() {
        let result = ExporterConfig::parse("{}");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API URL is required"));
    }

    #[test]
    fn test_validate_url_scheme() {
        let json = r#"{ opnsense: { url: "192.168.1.1" } }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("http:// or https://")
        );
    }

    #[test]
    fn test_validate_zero_timeout() {
        let json = r#"{ opnsense: { url: "http://fw", timeout_ms: 0 } }"#;
        assert!(ExporterConfig::parse(json).is_err());
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            opnsense: { url: "http://fw" },
            prometheus: { listen: "not-an-address" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let json = r#"{
            opnsense: { url: "http://fw" },
            prometheus: { path: "no-leading-slash" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );
    }

    #[test]
    fn test_validate_reserved_metrics_path() {
        for path in ["/health", "/ready"] {
            let mut config = ExporterConfig::default();
            config.opnsense.url = "http://fw".to_string();
            config.prometheus.path = path.to_string();

            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("already served"), "{}", path);
        }

        for path in ["/:id", "/metrics/*rest", "/a:b"] {
            let mut config = ExporterConfig::default();
            config.opnsense.url = "http://fw".to_string();
            config.prometheus.path = path.to_string();

            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("literal path"), "{}", path);
        }

        let mut config = ExporterConfig::default();
        config.opnsense.url = "http://fw".to_string();
        config.prometheus.path = "/gateways/metrics".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_gateway_pattern() {
        let json = r#"{
            opnsense: { url: "http://fw" },
            filters: { exclude_gateways: ["[unclosed"] }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid gateway pattern")
        );
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = ExporterConfig::default();
        config.opnsense.url = "http://from-file".to_string();
        config.opnsense.api_key = "file-key".to_string();

        config.apply_overrides(ConfigOverrides {
            api_url: Some("https://from-env".to_string()),
            api_secret: Some("env-secret".to_string()),
            listen: Some("127.0.0.1:9999".to_string()),
            ..Default::default()
        });

        assert_eq!(config.opnsense.url, "https://from-env");
        assert_eq!(config.opnsense.api_key, "file-key");
        assert_eq!(config.opnsense.api_secret, "env-secret");
        assert_eq!(config.prometheus.listen, "127.0.0.1:9999");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_without_file_requires_url() {
        let result = ExporterConfig::load(None, ConfigOverrides::default());
        assert!(matches!(result, Err(ConfigError::Validation(_))));

        let config = ExporterConfig::load(
            None,
            ConfigOverrides {
                api_url: Some("http://fw.lan".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.opnsense.url, "http://fw.lan");
    }

    #[test]
    fn test_load_from_file_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
                // comments are fine in JSON5
                opnsense: {{ url: "https://fw.lan", api_key: "k" }},
                prometheus: {{ listen: "127.0.0.1:8081" }},
            }}"#
        )
        .unwrap();

        let config = ExporterConfig::load(
            Some(file.path()),
            ConfigOverrides {
                api_key: Some("override".to_string()),
                log_level: Some("trace".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(config.opnsense.url, "https://fw.lan");
        assert_eq!(config.opnsense.api_key, "override");
        assert_eq!(config.prometheus.listen, "127.0.0.1:8081");
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_load_missing_file() {
        let result = ExporterConfig::load(
            Some(Path::new("/nonexistent/opnsense.json5")),
            ConfigOverrides::default(),
        );
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
