//! Telemetry for the audit engine
//!
//! - `metrics` - Prometheus collectors for runs, probes and the resilience layer
//! - `summary` - per-run summary record derived from a sealed run

pub mod metrics;
pub mod summary;

pub use metrics::{ActiveProbeGuard, AuditMetrics, AuditMetricsRegistry};
pub use summary::RunSummary;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Telemetry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Prometheus namespace for engine metrics
    pub namespace: String,

    /// Labels attached to every exported SLO metric
    pub labels: BTreeMap<String, String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            namespace: "host_audit".to_string(),
            labels: BTreeMap::new(),
        }
    }
}

impl TelemetryConfig {
    /// Create a new config builder
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::new()
    }
}

/// Builder for TelemetryConfig
pub struct TelemetryConfigBuilder {
    config: TelemetryConfig,
}

impl TelemetryConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TelemetryConfig::default(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.labels.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> TelemetryConfig {
        self.config
    }
}

impl Default for TelemetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
