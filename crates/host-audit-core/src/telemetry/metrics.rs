//! Prometheus metrics for the audit engine
//!
//! - `probe_executions_total` (counter) - probe results by probe and status
//! - `probe_duration_seconds` (histogram) - probe wall time by probe
//! - `findings_total` (counter) - findings by severity
//! - `risk_score` (gauge) - risk score of the latest run
//! - `audit_runs_total` (counter) - finalized runs by result
//! - `audit_duration_seconds` (histogram) - run wall time
//! - `analysis_calls_total` (counter) - analysis stage outcomes
//! - `active_probes` (gauge) - probes currently executing
//! - `rate_limiter_*`, `circuit_breaker_*` (gauges) - resilience layer state

use prometheus::{
    CounterVec, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::sync::Arc;

use super::{Result, TelemetryError};
use crate::contracts::{AuditRun, ProbeResult};
use crate::resilience::{CircuitBreakerState, CircuitState, RateLimiterStats};

/// Engine metrics. Cloning shares the underlying collectors.
#[derive(Clone)]
pub struct AuditMetrics {
    probe_executions_total: CounterVec,
    probe_duration_seconds: HistogramVec,
    findings_total: CounterVec,
    risk_score: Gauge,
    audit_runs_total: CounterVec,
    audit_duration_seconds: Histogram,
    analysis_calls_total: CounterVec,
    active_probes: Gauge,
    rate_limiter_in_flight: Gauge,
    rate_limiter_rejections: Gauge,
    circuit_breaker_state: Gauge,
    circuit_breaker_opens: Gauge,
}

impl AuditMetrics {
    /// Create the collectors and register them with `registry`
    pub fn new(registry: Arc<Registry>, namespace: &str) -> Result<Self> {
        let probe_executions_total = CounterVec::new(
            Opts::new("probe_executions_total", "Probe executions by final status")
                .namespace(namespace),
            &["probe", "status"],
        )?;

        let probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new("probe_duration_seconds", "Probe execution time in seconds")
                .namespace(namespace)
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["probe"],
        )?;

        let findings_total = CounterVec::new(
            Opts::new("findings_total", "Findings reported by severity").namespace(namespace),
            &["severity"],
        )?;

        let risk_score = Gauge::with_opts(
            Opts::new("risk_score", "Risk score of the most recent run (0-100)")
                .namespace(namespace),
        )?;

        let audit_runs_total = CounterVec::new(
            Opts::new("audit_runs_total", "Finalized audit runs by result").namespace(namespace),
            &["result"],
        )?;

        let audit_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("audit_duration_seconds", "Audit run duration in seconds")
                .namespace(namespace)
                .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;

        let analysis_calls_total = CounterVec::new(
            Opts::new("analysis_calls_total", "External analysis calls by outcome")
                .namespace(namespace),
            &["outcome"],
        )?;

        let active_probes = Gauge::with_opts(
            Opts::new("active_probes", "Probes currently executing").namespace(namespace),
        )?;

        let rate_limiter_in_flight = Gauge::with_opts(
            Opts::new("rate_limiter_in_flight", "External calls currently admitted")
                .namespace(namespace),
        )?;

        let rate_limiter_rejections = Gauge::with_opts(
            Opts::new("rate_limiter_rejections", "Cumulative rate limiter rejections")
                .namespace(namespace),
        )?;

        let circuit_breaker_state = Gauge::with_opts(
            Opts::new(
                "circuit_breaker_state",
                "Circuit breaker state (0 closed, 1 half-open, 2 open)",
            )
            .namespace(namespace),
        )?;

        let circuit_breaker_opens = Gauge::with_opts(
            Opts::new("circuit_breaker_opens", "Cumulative circuit breaker openings")
                .namespace(namespace),
        )?;

        registry.register(Box::new(probe_executions_total.clone()))?;
        registry.register(Box::new(probe_duration_seconds.clone()))?;
        registry.register(Box::new(findings_total.clone()))?;
        registry.register(Box::new(risk_score.clone()))?;
        registry.register(Box::new(audit_runs_total.clone()))?;
        registry.register(Box::new(audit_duration_seconds.clone()))?;
        registry.register(Box::new(analysis_calls_total.clone()))?;
        registry.register(Box::new(active_probes.clone()))?;
        registry.register(Box::new(rate_limiter_in_flight.clone()))?;
        registry.register(Box::new(rate_limiter_rejections.clone()))?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;
        registry.register(Box::new(circuit_breaker_opens.clone()))?;

        Ok(Self {
            probe_executions_total,
            probe_duration_seconds,
            findings_total,
            risk_score,
            audit_runs_total,
            audit_duration_seconds,
            analysis_calls_total,
            active_probes,
            rate_limiter_in_flight,
            rate_limiter_rejections,
            circuit_breaker_state,
            circuit_breaker_opens,
        })
    }

    /// Record one probe result
    pub fn record_probe(&self, result: &ProbeResult) {
        self.probe_executions_total
            .with_label_values(&[result.probe_name.as_str(), result.status.as_str()])
            .inc();
        self.probe_duration_seconds
            .with_label_values(&[result.probe_name.as_str()])
            .observe(result.execution_time_ms as f64 / 1000.0);
    }

    /// Record a sealed run: probe results, findings, risk and duration
    pub fn record_run(&self, run: &AuditRun) {
        for result in run.probe_results().values() {
            self.record_probe(result);
        }
        for finding in run.all_findings() {
            self.findings_total
                .with_label_values(&[finding.severity.as_str()])
                .inc();
        }
        self.risk_score.set(run.risk_score() as f64);

        let result = if run.is_partial() { "partial" } else { "complete" };
        self.audit_runs_total.with_label_values(&[result]).inc();
        self.audit_duration_seconds
            .observe(run.duration_ms() as f64 / 1000.0);
    }

    /// Record the outcome of the analysis stage
    pub fn record_analysis(&self, outcome: &str) {
        self.analysis_calls_total.with_label_values(&[outcome]).inc();
    }

    /// Mirror rate limiter statistics
    pub fn sync_rate_limiter(&self, stats: &RateLimiterStats) {
        self.rate_limiter_in_flight.set(stats.in_flight as f64);
        self.rate_limiter_rejections.set(stats.total_rejected as f64);
    }

    /// Mirror circuit breaker state
    pub fn sync_circuit_breaker(&self, state: &CircuitBreakerState) {
        let value = match state.state {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        };
        self.circuit_breaker_state.set(value);
        self.circuit_breaker_opens.set(state.total_opens as f64);
    }

    /// Mark a probe as executing until the guard is dropped
    pub fn track_active_probe(&self) -> ActiveProbeGuard {
        self.active_probes.inc();
        ActiveProbeGuard {
            gauge: self.active_probes.clone(),
        }
    }

    pub fn active_probes(&self) -> f64 {
        self.active_probes.get()
    }
}

/// RAII guard for the active probe gauge
pub struct ActiveProbeGuard {
    gauge: Gauge,
}

impl Drop for ActiveProbeGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Registry holding the engine metrics
pub struct AuditMetricsRegistry {
    registry: Arc<Registry>,
    metrics: AuditMetrics,
}

impl AuditMetricsRegistry {
    /// Create a new registry with the given namespace
    pub fn new(namespace: &str) -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = AuditMetrics::new(Arc::clone(&registry), namespace)?;
        Ok(Self { registry, metrics })
    }

    /// Create with an existing Prometheus registry
    pub fn with_registry(registry: Arc<Registry>, namespace: &str) -> Result<Self> {
        let metrics = AuditMetrics::new(Arc::clone(&registry), namespace)?;
        Ok(Self { registry, metrics })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> &AuditMetrics {
        &self.metrics
    }

    /// Gather all metric families
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Encode metrics as text for scraping
    pub fn encode_text(&self) -> Result<String> {
        encode_families(&self.gather())
    }
}

/// Encode metric families in the Prometheus text exposition format
pub(crate) fn encode_families(families: &[prometheus::proto::MetricFamily]) -> Result<String> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::EncodingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ProbeStatus;

    fn create_test_registry() -> AuditMetricsRegistry {
        AuditMetricsRegistry::new("host_audit").unwrap()
    }

    fn probe_result(name: &str, status: ProbeStatus) -> ProbeResult {
        ProbeResult {
            probe_name: name.to_string(),
            status,
            data: serde_json::Value::Null,
            findings: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            execution_time_ms: 250,
        }
    }

    #[test]
    fn test_record_probe_and_encode() {
        let registry = create_test_registry();
        registry.metrics().record_probe(&probe_result("ssh", ProbeStatus::Ok));
        registry.metrics().record_probe(&probe_result("ssh", ProbeStatus::Timeout));

        let text = registry.encode_text().unwrap();
        assert!(text.contains("host_audit_probe_executions_total"));
        assert!(text.contains("status=\"timeout\""));
        assert!(text.contains("host_audit_probe_duration_seconds"));
    }

    #[test]
    fn test_active_probe_guard() {
        let registry = create_test_registry();
        let metrics = registry.metrics();

        let first = metrics.track_active_probe();
        let second = metrics.track_active_probe();
        assert_eq!(metrics.active_probes(), 2.0);

        drop(first);
        assert_eq!(metrics.active_probes(), 1.0);
        drop(second);
        assert_eq!(metrics.active_probes(), 0.0);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Arc::new(Registry::new());
        AuditMetrics::new(Arc::clone(&registry), "host_audit").unwrap();
        assert!(AuditMetrics::new(registry, "host_audit").is_err());
    }

    #[test]
    fn test_sync_resilience_state() {
        let registry = create_test_registry();
        registry.metrics().sync_rate_limiter(&RateLimiterStats {
            requests_last_minute: 3,
            requests_last_hour: 3,
            in_flight: 1,
            max_concurrent: 5,
            total_granted: 3,
            total_rejected: 2,
        });

        let text = registry.encode_text().unwrap();
        assert!(text.contains("host_audit_rate_limiter_rejections 2"));
        assert!(text.contains("host_audit_rate_limiter_in_flight 1"));
    }
}
