//! Per-run summary record

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::contracts::{AuditRun, ProbeStatus, RiskLevel, Severity};
use crate::resilience::{CircuitBreakerState, RateLimiterStats};

/// Flat summary of one sealed run plus resilience state at finalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub audit_id: String,
    pub hostname: String,
    pub platform: String,
    pub duration_ms: u64,
    pub probes_total: usize,
    pub probes_ok: usize,
    pub probes_partial: usize,
    pub probes_failed: usize,
    pub probes_timed_out: usize,
    pub probes_pending: usize,
    pub findings_by_severity: BTreeMap<Severity, usize>,
    pub findings_total: usize,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub analysis_degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limiter: Option<RateLimiterStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerState>,
}

impl RunSummary {
    pub fn from_run(run: &AuditRun) -> Self {
        let mut findings_by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for finding in run.all_findings() {
            *findings_by_severity.entry(finding.severity).or_default() += 1;
        }

        Self {
            audit_id: run.audit_id().to_string(),
            hostname: run.hostname().to_string(),
            platform: run.platform().to_string(),
            duration_ms: run.duration_ms(),
            probes_total: run.probe_results().len(),
            probes_ok: run.count_status(ProbeStatus::Ok),
            probes_partial: run.count_status(ProbeStatus::Partial),
            probes_failed: run.count_status(ProbeStatus::Error),
            probes_timed_out: run.count_status(ProbeStatus::Timeout),
            probes_pending: run.count_status(ProbeStatus::Pending),
            findings_by_severity,
            findings_total: run.all_findings().len(),
            risk_score: run.risk_score(),
            risk_level: run.risk_level(),
            analysis_degraded: run.analysis().is_degraded(),
            rate_limiter: None,
            circuit_breaker: None,
        }
    }

    pub fn with_rate_limiter(mut self, stats: RateLimiterStats) -> Self {
        self.rate_limiter = Some(stats);
        self
    }

    pub fn with_circuit_breaker(mut self, state: CircuitBreakerState) -> Self {
        self.circuit_breaker = Some(state);
        self
    }

    /// Share of probes that errored or timed out, in percent
    pub fn probe_failure_rate_percent(&self) -> f64 {
        if self.probes_total == 0 {
            return 0.0;
        }
        (self.probes_failed + self.probes_timed_out) as f64 * 100.0 / self.probes_total as f64
    }

    pub fn critical_findings(&self) -> usize {
        self.findings_by_severity
            .get(&Severity::Critical)
            .copied()
            .unwrap_or(0)
    }
}
