//! Mapping from normalized gateways to Prometheus metric families.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use tracing::warn;

use crate::config::StddevMode;
use crate::gateway::NormalizedGateway;

/// Sanitize a metric name to be Prometheus-compatible.
///
/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
/// This function:
/// - Replaces invalid characters with underscores
/// - Ensures the name starts with a letter or underscore
/// - Collapses multiple underscores into one
pub fn sanitize_metric_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 1);
    let mut last_was_underscore = false;
    let mut chars = name.chars().peekable();

    if let Some(&first) = chars.peek()
        && first.is_ascii_digit()
    {
        result.push('_');
        last_was_underscore = true;
    }

    for c in chars {
        if c.is_ascii_alphanumeric() || c == ':' {
            result.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    if result.is_empty() {
        result.push_str("unnamed");
    }

    result
}

/// Sanitize a label name to be Prometheus-compatible.
///
/// Prometheus label names must match `[a-zA-Z_][a-zA-Z0-9_]*`.
/// Labels starting with `__` are reserved for internal use.
pub fn sanitize_label_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());

    for (i, c) in name.chars().enumerate() {
        if c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()) {
            result.push(c);
        } else if !result.ends_with('_') {
            result.push('_');
        }
    }

    match result.trim_end_matches('_') {
        "" => "label".to_string(),
        reserved if reserved.starts_with("__") => format!("z{}", reserved),
        name => name.to_string(),
    }
}

/// Prometheus metric type of a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrometheusType {
    Gauge,
}

impl PrometheusType {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrometheusType::Gauge => "gauge",
        }
    }
}

/// Static description of a metric family.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDesc {
    pub name: String,
    pub help: &'static str,
    pub metric_type: PrometheusType,
    pub label_names: Vec<&'static str>,
}

impl MetricDesc {
    fn gauge(prefix: &str, suffix: &str, help: &'static str, label_names: &[&'static str]) -> Self {
        let name = if prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", sanitize_metric_name(prefix), suffix)
        };

        Self {
            name,
            help,
            metric_type: PrometheusType::Gauge,
            label_names: label_names.to_vec(),
        }
    }
}

/// One observation in a family.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Label pairs, in descriptor order followed by constant labels.
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

/// A descriptor together with the samples emitted for it in one scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily<'a> {
    pub desc: &'a MetricDesc,
    pub samples: Vec<Sample>,
}

/// The four gateway metric families, built once at startup.
#[derive(Debug, Clone)]
pub struct GatewayMetrics {
    status: MetricDesc,
    loss: MetricDesc,
    delay: MetricDesc,
    stddev: MetricDesc,
    stddev_mode: StddevMode,
    const_labels: Vec<(String, String)>,
}

impl GatewayMetrics {
    /// Build the descriptor set.
    ///
    /// `default_labels` are sanitized and sorted; any that collide with a
    /// built-in label name are dropped.
    pub fn new(
        prefix: &str,
        stddev_mode: StddevMode,
        default_labels: &HashMap<String, String>,
    ) -> Self {
        let status = MetricDesc::gauge(
            prefix,
            "gateway_status",
            "OPNsense gateway status",
            &["gateway", "address", "status_translated"],
        );
        let loss = MetricDesc::gauge(
            prefix,
            "gateway_loss_pct",
            "OPNsense gateway packet loss percentage",
            &["gateway", "address"],
        );
        let delay = MetricDesc::gauge(
            prefix,
            "gateway_delay_ms",
            "OPNsense gateway delay in milliseconds",
            &["gateway", "address"],
        );
        let stddev_labels: &[&'static str] = match stddev_mode {
            StddevMode::Stddev => &["gateway", "address"],
            StddevMode::Legacy => &["gateway", "stddev"],
        };
        let stddev = MetricDesc::gauge(
            prefix,
            "gateway_stddev_ms",
            "OPNsense gateway standard deviation in milliseconds",
            stddev_labels,
        );

        let reserved = ["gateway", "address", "status_translated", "stddev"];
        let mut const_labels: Vec<(String, String)> = Vec::with_capacity(default_labels.len());
        for (k, v) in default_labels {
            let key = sanitize_label_name(k);
            if !reserved.contains(&key.as_str()) && !const_labels.iter().any(|(lk, _)| lk == &key)
            {
                const_labels.push((key, v.clone()));
            }
        }
        const_labels.sort_by(|a, b| a.0.cmp(&b.0));

        Self {
            status,
            loss,
            delay,
            stddev,
            stddev_mode,
            const_labels,
        }
    }

    /// Descriptors in exposition order.
    pub fn descriptors(&self) -> [&MetricDesc; 4] {
        [&self.status, &self.loss, &self.delay, &self.stddev]
    }

    /// Emit one sample per family for every gateway.
    ///
    /// A gateway repeating an earlier (name, address) pair would produce
    /// duplicate series; only the first occurrence is exported.
    pub fn emit(&self, gateways: &[NormalizedGateway]) -> Vec<MetricFamily<'_>> {
        let mut status = Vec::with_capacity(gateways.len());
        let mut loss = Vec::with_capacity(gateways.len());
        let mut delay = Vec::with_capacity(gateways.len());
        let mut stddev = Vec::with_capacity(gateways.len());
        let mut seen = HashSet::with_capacity(gateways.len());

        for gw in gateways {
            if !seen.insert((gw.name.as_str(), gw.address.as_str())) {
                warn!(
                    gateway = %gw.name,
                    address = %gw.address,
                    "Duplicate gateway in status response, skipping"
                );
                continue;
            }

            status.push(self.sample(
                &self.status,
                &[
                    gw.name.as_str(),
                    gw.address.as_str(),
                    gw.status_translated.as_str(),
                ],
                if gw.up { 1.0 } else { 0.0 },
            ));

            let ident = [gw.name.as_str(), gw.address.as_str()];
            loss.push(self.sample(&self.loss, &ident, gw.loss_pct));
            delay.push(self.sample(&self.delay, &ident, gw.delay_ms));

            let stddev_value = match self.stddev_mode {
                StddevMode::Stddev => gw.stddev_ms,
                StddevMode::Legacy => gw.delay_ms,
            };
            stddev.push(self.sample(&self.stddev, &ident, stddev_value));
        }

        vec![
            MetricFamily {
                desc: &self.status,
                samples: status,
            },
            MetricFamily {
                desc: &self.loss,
                samples: loss,
            },
            MetricFamily {
                desc: &self.delay,
                samples: delay,
            },
            MetricFamily {
                desc: &self.stddev,
                samples: stddev,
            },
        ]
    }

    fn sample(&self, desc: &MetricDesc, values: &[&str], value: f64) -> Sample {
        let mut labels = Vec::with_capacity(values.len() + self.const_labels.len());
        for (name, v) in desc.label_names.iter().zip(values) {
            labels.push((name.to_string(), v.to_string()));
        }
        labels.extend(self.const_labels.iter().cloned());

        Sample { labels, value }
    }
}

impl Sample {
    /// Append `name{labels} value\n` to `out`.
    fn write_line(&self, out: &mut String, name: &str) {
        out.push_str(name);
        if !self.labels.is_empty() {
            out.push('{');
            for (i, (key, value)) in self.labels.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(key);
                out.push_str("=\"");
                push_escaped(out, value, true);
                out.push('"');
            }
            out.push('}');
        }
        out.push(' ');
        out.push_str(&exposition_value(self.value));
        out.push('\n');
    }
}

/// Render families in Prometheus text exposition format.
///
/// Families without samples produce no output at all.
pub fn render(families: &[MetricFamily<'_>]) -> String {
    let mut output = String::new();

    for family in families {
        if family.samples.is_empty() {
            continue;
        }

        let desc = family.desc;
        output.push_str("# HELP ");
        output.push_str(&desc.name);
        output.push(' ');
        push_escaped(&mut output, desc.help, false);
        output.push('\n');
        let _ = writeln!(output, "# TYPE {} {}", desc.name, desc.metric_type.as_str());

        for sample in &family.samples {
            sample.write_line(&mut output, &desc.name);
        }
    }

    output
}

/// Escape backslash and newline, plus double quotes inside label values.
fn push_escaped(out: &mut String, text: &str, quotes: bool) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' if quotes => out.push_str("\\\""),
            c => out.push(c),
        }
    }
}

/// Sample value as the exposition format spells it.
fn exposition_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}
