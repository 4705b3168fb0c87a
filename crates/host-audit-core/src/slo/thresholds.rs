//! SLO threshold definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of a level counts as a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Violated when the value rises above the level
    Above,
    /// Violated when the value drops below the level
    Below,
}

impl Direction {
    fn crosses(&self, value: f64, level: f64) -> bool {
        match self {
            Direction::Above => value > level,
            Direction::Below => value < level,
        }
    }
}

/// Unit attached to exported values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MetricUnit {
    Count,
    Milliseconds,
    Seconds,
    Percent,
    #[default]
    None,
}

impl MetricUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricUnit::Count => "Count",
            MetricUnit::Milliseconds => "Milliseconds",
            MetricUnit::Seconds => "Seconds",
            MetricUnit::Percent => "Percent",
            MetricUnit::None => "None",
        }
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Warning => f.write_str("warning"),
            AlertSeverity::Critical => f.write_str("critical"),
        }
    }
}

/// Threshold for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloThreshold {
    pub metric_name: String,
    pub warning_level: f64,
    pub critical_level: f64,
    pub direction: Direction,
    #[serde(default)]
    pub unit: MetricUnit,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub remediation_hint: String,
}

impl SloThreshold {
    pub fn above(name: impl Into<String>, warning: f64, critical: f64) -> Self {
        Self::new(name, warning, critical, Direction::Above)
    }

    pub fn below(name: impl Into<String>, warning: f64, critical: f64) -> Self {
        Self::new(name, warning, critical, Direction::Below)
    }

    fn new(name: impl Into<String>, warning: f64, critical: f64, direction: Direction) -> Self {
        Self {
            metric_name: name.into(),
            warning_level: warning,
            critical_level: critical,
            direction,
            unit: MetricUnit::None,
            description: String::new(),
            remediation_hint: String::new(),
        }
    }

    pub fn with_unit(mut self, unit: MetricUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_remediation(mut self, hint: impl Into<String>) -> Self {
        self.remediation_hint = hint.into();
        self
    }

    /// Classify a value; `None` means within objective
    pub fn classify(&self, value: f64) -> Option<(AlertSeverity, f64)> {
        if value.is_nan() {
            return None;
        }
        if self.direction.crosses(value, self.critical_level) {
            Some((AlertSeverity::Critical, self.critical_level))
        } else if self.direction.crosses(value, self.warning_level) {
            Some((AlertSeverity::Warning, self.warning_level))
        } else {
            None
        }
    }

    /// Critical must be at least as strict as warning for the direction
    pub fn validate(&self) -> Result<(), String> {
        if !self.warning_level.is_finite() || !self.critical_level.is_finite() {
            return Err(format!("threshold {} has non-finite levels", self.metric_name));
        }
        let ordered = match self.direction {
            Direction::Above => self.critical_level >= self.warning_level,
            Direction::Below => self.critical_level <= self.warning_level,
        };
        if ordered {
            Ok(())
        } else {
            Err(format!(
                "threshold {}: critical level {} is less strict than warning level {}",
                self.metric_name, self.critical_level, self.warning_level
            ))
        }
    }
}

/// Thresholds shipped with the engine
pub fn default_thresholds() -> Vec<SloThreshold> {
    vec![
        SloThreshold::above("audit_duration_ms", 120_000.0, 600_000.0)
            .with_unit(MetricUnit::Milliseconds)
            .with_description("Wall time of a complete audit run")
            .with_remediation("Lower per-probe timeouts or raise max_concurrency"),
        SloThreshold::above("analysis_latency_ms", 3_000.0, 10_000.0)
            .with_unit(MetricUnit::Milliseconds)
            .with_description("Latency of the external analysis call")
            .with_remediation("Check analysis provider health and network path"),
        SloThreshold::above("probe_failure_rate_percent", 2.0, 10.0)
            .with_unit(MetricUnit::Percent)
            .with_description("Share of probes ending in error or timeout")
            .with_remediation("Inspect errored probes and their evidence findings"),
        SloThreshold::above("system_error_rate_percent", 1.0, 5.0)
            .with_unit(MetricUnit::Percent)
            .with_description("Share of engine operations that failed")
            .with_remediation("Review engine logs for repeated errors"),
        SloThreshold::above("circuit_breaker_open_count", 0.0, 5.0)
            .with_unit(MetricUnit::Count)
            .with_description("Times the analysis circuit breaker opened")
            .with_remediation("External analysis provider is failing; verify its availability"),
        SloThreshold::above("rate_limit_hits", 10.0, 50.0)
            .with_unit(MetricUnit::Count)
            .with_description("Rate limiter rejections")
            .with_remediation("Raise rate limits or reduce audit frequency"),
        SloThreshold::above("risk_score", 50.0, 75.0)
            .with_unit(MetricUnit::None)
            .with_description("Risk score of the latest audit")
            .with_remediation("Remediate CRITICAL and HIGH findings"),
        SloThreshold::below("system_uptime_percent", 99.5, 99.0)
            .with_unit(MetricUnit::Percent)
            .with_description("Availability of the audit service")
            .with_remediation("Investigate restarts and crash loops"),
    ]
}
