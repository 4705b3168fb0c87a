//! Result aggregation
//!
//! Turns per-probe results into one sealed [`AuditRun`]. The output depends
//! only on the results themselves, never on the order probes completed in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::contracts::*;
use crate::error::Result;

/// Critical/high issues carried into a fallback report
const MAX_CRITICAL_ISSUES: usize = 10;

/// Per-severity weights for the risk score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub info: u32,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 50,
            high: 25,
            medium: 10,
            low: 5,
            info: 1,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }
}

/// Aggregator configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub weights: SeverityWeights,
}

/// Identity of the audited host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub platform: String,
    pub platform_version: String,
}

impl HostInfo {
    /// Detect the local host
    pub fn detect() -> Self {
        Self {
            hostname: detect_hostname(),
            platform: std::env::consts::OS.to_string(),
            platform_version: read_trimmed("/proc/sys/kernel/osrelease").unwrap_or_default(),
        }
    }

    pub fn fixed(
        hostname: impl Into<String>,
        platform: impl Into<String>,
        platform_version: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            platform: platform.into(),
            platform_version: platform_version.into(),
        }
    }
}

fn detect_hostname() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .or_else(|| read_trimmed("/proc/sys/kernel/hostname"))
        .or_else(|| read_trimmed("/etc/hostname"))
        .unwrap_or_else(|| "unknown".to_string())
}

fn read_trimmed(path: &str) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Timestamp-prefixed run identifier, e.g. `20260101_120000_123456_a1b2c3`
pub fn generate_audit_id(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", at.format("%Y%m%d_%H%M%S_%6f"), &suffix[..6])
}

/// Everything the aggregator needs to seal a run
#[derive(Debug, Clone)]
pub struct RunDraft {
    pub audit_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub results: Vec<ProbeResult>,
    pub analysis: AnalysisStage,
}

impl RunDraft {
    pub fn new(results: Vec<ProbeResult>) -> Self {
        let started_at = Utc::now();
        Self {
            audit_id: generate_audit_id(started_at),
            started_at,
            duration_ms: 0,
            results,
            analysis: AnalysisStage::NotRequested,
        }
    }
}

/// Merges probe results and seals the run
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    config: AggregatorConfig,
    host: HostInfo,
}

impl ResultAggregator {
    pub fn new(config: AggregatorConfig, host: HostInfo) -> Self {
        Self { config, host }
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    /// Seal results gathered outside an engine run
    pub fn finalize(&self, results: Vec<ProbeResult>) -> Result<AuditRun> {
        self.seal(RunDraft::new(results))
    }

    /// Key results by probe name, merge findings, score and hash
    pub fn seal(&self, draft: RunDraft) -> Result<AuditRun> {
        let mut probe_results = BTreeMap::new();
        for result in draft.results {
            probe_results
                .entry(result.probe_name.clone())
                .or_insert(result);
        }

        let all_findings = merge_findings(&probe_results);
        let risk_score = self.risk_score(&all_findings);

        let run = AuditRun::seal(AuditRunParts {
            audit_id: draft.audit_id,
            timestamp: draft.started_at,
            hostname: self.host.hostname.clone(),
            platform: self.host.platform.clone(),
            platform_version: self.host.platform_version.clone(),
            duration_ms: draft.duration_ms,
            probe_results,
            all_findings,
            risk_score,
            analysis: draft.analysis,
        })?;

        tracing::debug!(
            audit_id = %run.audit_id(),
            findings = run.all_findings().len(),
            risk_score = run.risk_score(),
            hash = %run.integrity_hash(),
            "Sealed audit run"
        );
        Ok(run)
    }

    /// Weighted sum over severities, clamped to 0..=100
    pub fn risk_score(&self, findings: &[Finding]) -> u8 {
        let total: u64 = findings
            .iter()
            .map(|f| self.config.weights.weight(f.severity) as u64)
            .sum();
        total.min(100) as u8
    }

    /// Local analysis used when the external provider is unavailable
    pub fn fallback_report(&self, findings: &[Finding]) -> AnalysisReport {
        let critical_issues: Vec<String> = findings
            .iter()
            .filter(|f| f.severity.is_actionable())
            .take(MAX_CRITICAL_ISSUES)
            .map(|f| format!("{}: {}", f.check_id, f.description))
            .collect();
        let critical_count = findings
            .iter()
            .filter(|f| f.severity == Severity::Critical)
            .count();

        AnalysisReport {
            risk_score: self.risk_score(findings),
            executive_summary: format!(
                "Audit identified {} findings requiring attention. {} critical issues detected.",
                findings.len(),
                critical_count
            ),
            critical_issues,
            recommendations: vec![
                "Address all CRITICAL findings immediately".to_string(),
                "Review and remediate HIGH severity findings".to_string(),
                "Implement security monitoring and alerting".to_string(),
                "Conduct regular security audits".to_string(),
            ],
            provider: "local".to_string(),
        }
    }
}

/// Merge findings from every probe into report order.
///
/// Findings are deduplicated only when check id, severity and description
/// all match; the first occurrence in probe-name order is kept.
pub fn merge_findings(results: &BTreeMap<String, ProbeResult>) -> Vec<Finding> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Finding> = Vec::new();

    for result in results.values() {
        for finding in &result.findings {
            let identity = finding.identity();
            if seen.contains(&identity) {
                continue;
            }
            seen.insert(identity);
            merged.push(finding.clone());
        }
    }

    merged.sort_by(Finding::report_order);
    merged
}
