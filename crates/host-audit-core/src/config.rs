//! Engine configuration
//!
//! Loaded from TOML, YAML or JSON, then overridden from `AUDIT_*`
//! environment variables. Every section has defaults, so an empty file is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::aggregator::AggregatorConfig;
use crate::engine::SchedulerConfig;
use crate::error::{AuditError, Result};
use crate::resilience::{BackoffPolicy, CircuitBreakerConfig, RateLimitConfig, RateLimitPolicy};
use crate::slo::SloConfig;
use crate::telemetry::TelemetryConfig;

/// External analysis provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:8080".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub backoff: BackoffPolicy,
    pub aggregator: AggregatorConfig,
    pub slo: SloConfig,
    pub telemetry: TelemetryConfig,
    pub analysis: AnalysisConfig,
}

/// On-disk configuration formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            other => Err(AuditError::config(format!(
                "unsupported config file extension: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }
}

impl EngineConfig {
    /// Create a new config builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Load, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a file; the format is chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_str_with_format(&content, format)?;
        tracing::debug!(path = %path.display(), ?format, "Loaded engine configuration");
        Ok(config)
    }

    pub fn from_str_with_format(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => {
                if content.trim().is_empty() {
                    Self::default()
                } else {
                    serde_yaml::from_str(content)?
                }
            }
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Override fields from `AUDIT_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Override fields from an arbitrary variable lookup.
    ///
    /// Values that fail to parse leave the field unchanged.
    pub fn apply_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let s = &mut self.scheduler;
        override_parsed(&lookup, "AUDIT_EXECUTION_MODE", &mut s.mode);
        override_parsed(&lookup, "AUDIT_MAX_CONCURRENCY", &mut s.max_concurrency);
        if let Some(ms) = lookup("AUDIT_PROBE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            s.per_probe_timeout_ms = Some(ms);
        }
        override_parsed(&lookup, "AUDIT_GLOBAL_TIMEOUT_MS", &mut s.global_timeout_ms);
        override_parsed(&lookup, "AUDIT_REQUIRE_ELEVATED", &mut s.require_elevated);

        let r = &mut self.rate_limit;
        override_parsed(&lookup, "AUDIT_RATE_LIMIT_PER_MINUTE", &mut r.max_requests_per_minute);
        override_parsed(&lookup, "AUDIT_RATE_LIMIT_PER_HOUR", &mut r.max_requests_per_hour);
        override_parsed(&lookup, "AUDIT_RATE_LIMIT_CONCURRENT", &mut r.max_concurrent_requests);
        if let Some(wait) = lookup("AUDIT_RATE_LIMIT_QUEUE_WAIT_MS").and_then(|v| v.parse().ok()) {
            r.policy = RateLimitPolicy::Queue { max_wait_ms: wait };
        }

        let c = &mut self.circuit_breaker;
        override_parsed(&lookup, "AUDIT_CIRCUIT_FAILURE_THRESHOLD", &mut c.failure_threshold);
        override_parsed(&lookup, "AUDIT_CIRCUIT_COOLDOWN_MS", &mut c.cooldown_ms);

        override_parsed(&lookup, "AUDIT_BACKOFF_MAX_RETRIES", &mut self.backoff.max_retries);

        let a = &mut self.analysis;
        override_parsed(&lookup, "AUDIT_ANALYSIS_ENABLED", &mut a.enabled);
        if let Some(endpoint) = lookup("AUDIT_ANALYSIS_ENDPOINT") {
            a.endpoint = endpoint;
        }
        override_parsed(&lookup, "AUDIT_ANALYSIS_TIMEOUT_MS", &mut a.timeout_ms);

        if let Some(namespace) = lookup("AUDIT_METRICS_NAMESPACE") {
            self.telemetry.namespace = namespace;
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().map_err(AuditError::Config)?;
        self.rate_limit.validate().map_err(AuditError::Config)?;
        self.circuit_breaker.validate().map_err(AuditError::Config)?;
        self.backoff.validate().map_err(AuditError::Config)?;
        for threshold in &self.slo.thresholds {
            threshold.validate().map_err(AuditError::Config)?;
        }
        if self.analysis.enabled && self.analysis.endpoint.trim().is_empty() {
            return Err(AuditError::config("analysis endpoint is required when analysis is enabled"));
        }
        if self.telemetry.namespace.is_empty() {
            return Err(AuditError::config("telemetry namespace must not be empty"));
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparsable override"),
        }
    }
}

/// Builder for EngineConfig
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.config.scheduler = scheduler;
        self
    }

    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    pub fn circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = circuit_breaker;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.config.backoff = backoff;
        self
    }

    pub fn aggregator(mut self, aggregator: AggregatorConfig) -> Self {
        self.config.aggregator = aggregator;
        self
    }

    pub fn slo(mut self, slo: SloConfig) -> Self {
        self.config.slo = slo;
        self
    }

    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    pub fn analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.config.analysis = analysis;
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
