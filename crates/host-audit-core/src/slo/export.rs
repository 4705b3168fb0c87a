//! Metric snapshot export formats

use chrono::{DateTime, Utc};
use prometheus::{Gauge, GaugeVec, Opts, Registry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use super::{AlertSeverity, Observation, SloThreshold};
use crate::telemetry::metrics::encode_families;
use crate::telemetry::{Result, TelemetryError};

const EXPORT_NAMESPACE: &str = "host_audit_slo";

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// `name{labels} value` lines in Prometheus exposition format
    Prometheus,
    /// JSON array of `{metricName, dimensions, value, unit}` records
    Structured,
    /// JSON object keyed by metric name
    Json,
}

impl FromStr for ExportFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "prometheus" | "text" => Ok(ExportFormat::Prometheus),
            "structured" | "cloudwatch" => Ok(ExportFormat::Structured),
            "json" => Ok(ExportFormat::Json),
            other => Err(TelemetryError::ConfigError(format!(
                "unknown export format: {}",
                other
            ))),
        }
    }
}

/// One name/value dimension of a structured record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// Structured metric record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

/// Entry of the JSON snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub value: f64,
    pub unit: String,
    pub status: String,
    pub observed_at: DateTime<Utc>,
}

pub(super) fn render(
    format: ExportFormat,
    observations: &BTreeMap<String, Observation>,
    thresholds: &BTreeMap<String, SloThreshold>,
    labels: &BTreeMap<String, String>,
) -> Result<String> {
    match format {
        ExportFormat::Prometheus => render_prometheus(observations, thresholds, labels),
        ExportFormat::Structured => {
            let records = structured_records(observations, thresholds, labels);
            serde_json::to_string_pretty(&records)
                .map_err(|e| TelemetryError::EncodingError(e.to_string()))
        }
        ExportFormat::Json => {
            let snapshot: BTreeMap<&str, SnapshotEntry> = observations
                .iter()
                .map(|(name, obs)| {
                    let threshold = thresholds.get(name);
                    (
                        name.as_str(),
                        SnapshotEntry {
                            value: obs.value,
                            unit: unit_of(threshold),
                            status: status_of(threshold, obs.value).to_string(),
                            observed_at: obs.observed_at,
                        },
                    )
                })
                .collect();
            serde_json::to_string_pretty(&snapshot)
                .map_err(|e| TelemetryError::EncodingError(e.to_string()))
        }
    }
}

/// Structured records for every observed metric
pub(super) fn structured_records(
    observations: &BTreeMap<String, Observation>,
    thresholds: &BTreeMap<String, SloThreshold>,
    labels: &BTreeMap<String, String>,
) -> Vec<MetricRecord> {
    let dimensions: Vec<Dimension> = labels
        .iter()
        .map(|(name, value)| Dimension {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();

    observations
        .iter()
        .map(|(name, obs)| MetricRecord {
            metric_name: name.clone(),
            dimensions: dimensions.clone(),
            value: obs.value,
            unit: unit_of(thresholds.get(name)),
            timestamp: obs.observed_at,
        })
        .collect()
}

fn render_prometheus(
    observations: &BTreeMap<String, Observation>,
    thresholds: &BTreeMap<String, SloThreshold>,
    labels: &BTreeMap<String, String>,
) -> Result<String> {
    let const_labels: HashMap<String, String> = labels
        .iter()
        .map(|(k, v)| (sanitize_name(k), v.clone()))
        .collect();
    let registry = Registry::new_custom(Some(EXPORT_NAMESPACE.to_string()), Some(const_labels))?;

    let status = GaugeVec::new(
        Opts::new("objective_status", "Objective status per metric (0 ok, 1 warning, 2 critical)"),
        &["metric"],
    )?;
    registry.register(Box::new(status.clone()))?;

    for (name, obs) in observations {
        let threshold = thresholds.get(name);
        let help = threshold
            .map(|t| t.description.as_str())
            .filter(|d| !d.is_empty())
            .unwrap_or("Observed value");

        let gauge = Gauge::with_opts(Opts::new(sanitize_name(name), help))?;
        gauge.set(obs.value);
        registry.register(Box::new(gauge))?;

        if threshold.is_some() {
            let level = match threshold.and_then(|t| t.classify(obs.value)) {
                None => 0.0,
                Some((AlertSeverity::Warning, _)) => 1.0,
                Some((AlertSeverity::Critical, _)) => 2.0,
            };
            status.with_label_values(&[name.as_str()]).set(level);
        }
    }

    encode_families(&registry.gather())
}

fn unit_of(threshold: Option<&SloThreshold>) -> String {
    threshold
        .map(|t| t.unit.as_str())
        .unwrap_or("None")
        .to_string()
}

fn status_of(threshold: Option<&SloThreshold>, value: f64) -> &'static str {
    match threshold.and_then(|t| t.classify(value)) {
        None if threshold.is_none() => "untracked",
        None => "ok",
        Some((AlertSeverity::Warning, _)) => "warning",
        Some((AlertSeverity::Critical, _)) => "critical",
    }
}

/// Map an arbitrary metric name onto the Prometheus name charset
fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
