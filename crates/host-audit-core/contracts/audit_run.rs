//! Sealed audit run record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use super::{Finding, ProbeResult, ProbeStatus};

/// Name of the field excluded from the hash preimage
const HASH_FIELD: &str = "integrity_hash";

/// Overall risk bucket derived from the risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            75..=u8::MAX => RiskLevel::Critical,
            50..=74 => RiskLevel::High,
            25..=49 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enrichment produced by the external analysis provider, or computed
/// locally when the provider is unavailable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Provider-assessed risk (0-100)
    pub risk_score: u8,

    /// Short narrative summary
    pub executive_summary: String,

    /// Issues that need immediate attention
    #[serde(default)]
    pub critical_issues: Vec<String>,

    /// Recommended actions
    #[serde(default)]
    pub recommendations: Vec<String>,

    /// Who produced the report
    pub provider: String,
}

/// Outcome of the optional analysis stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AnalysisStage {
    #[default]
    NotRequested,
    Completed {
        report: AnalysisReport,
    },
    Degraded {
        reason: String,
        fallback: AnalysisReport,
    },
}

impl AnalysisStage {
    pub fn is_degraded(&self) -> bool {
        matches!(self, AnalysisStage::Degraded { .. })
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            AnalysisStage::NotRequested => None,
            AnalysisStage::Completed { report } => Some(report),
            AnalysisStage::Degraded { fallback, .. } => Some(fallback),
        }
    }
}

/// Stored and recomputed hashes differ
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Integrity violation for audit {audit_id}: expected {expected}, computed {actual}")]
pub struct IntegrityViolation {
    pub audit_id: String,
    pub expected: String,
    pub actual: String,
}

/// Unsealed parts of a run, assembled by the aggregator
#[derive(Debug, Clone)]
pub struct AuditRunParts {
    pub audit_id: String,
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub platform: String,
    pub platform_version: String,
    pub duration_ms: u64,
    pub probe_results: BTreeMap<String, ProbeResult>,
    pub all_findings: Vec<Finding>,
    pub risk_score: u8,
    pub analysis: AnalysisStage,
}

/// Finalized, hash-sealed result of one orchestration pass.
///
/// Fields are read-only once sealed. A record obtained by deserialization
/// must be checked with [`AuditRun::verify_integrity`] before it is trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRun {
    audit_id: String,
    timestamp: DateTime<Utc>,
    hostname: String,
    platform: String,
    platform_version: String,
    duration_ms: u64,
    probe_results: BTreeMap<String, ProbeResult>,
    all_findings: Vec<Finding>,
    risk_score: u8,
    risk_level: RiskLevel,
    analysis: AnalysisStage,
    partial: bool,
    integrity_hash: String,
}

impl AuditRun {
    /// Seal the run: derive the summary fields and compute the hash once
    pub(crate) fn seal(parts: AuditRunParts) -> Result<Self, serde_json::Error> {
        let partial = parts.analysis.is_degraded()
            || parts
                .probe_results
                .values()
                .any(|r| r.status != ProbeStatus::Ok);

        let mut run = Self {
            audit_id: parts.audit_id,
            timestamp: parts.timestamp,
            hostname: parts.hostname,
            platform: parts.platform,
            platform_version: parts.platform_version,
            duration_ms: parts.duration_ms,
            probe_results: parts.probe_results,
            all_findings: parts.all_findings,
            risk_score: parts.risk_score.min(100),
            risk_level: RiskLevel::from_score(parts.risk_score.min(100)),
            analysis: parts.analysis,
            partial,
            integrity_hash: String::new(),
        };
        run.integrity_hash = run.compute_hash()?;
        Ok(run)
    }

    /// Canonical serialization: every field except the hash, keys sorted
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = &mut value {
            map.remove(HASH_FIELD);
        }
        serde_json::to_vec(&value)
    }

    /// SHA-256 over the canonical serialization, hex encoded
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_bytes()?);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Recompute the hash and compare it with the stored one
    pub fn verify_integrity(&self) -> Result<(), IntegrityViolation> {
        let actual = self
            .compute_hash()
            .unwrap_or_else(|e| format!("unhashable: {}", e));
        if actual == self.integrity_hash {
            Ok(())
        } else {
            Err(IntegrityViolation {
                audit_id: self.audit_id.clone(),
                expected: self.integrity_hash.clone(),
                actual,
            })
        }
    }

    pub fn audit_id(&self) -> &str {
        &self.audit_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn platform_version(&self) -> &str {
        &self.platform_version
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn probe_results(&self) -> &BTreeMap<String, ProbeResult> {
        &self.probe_results
    }

    pub fn probe_result(&self, name: &str) -> Option<&ProbeResult> {
        self.probe_results.get(name)
    }

    pub fn all_findings(&self) -> &[Finding] {
        &self.all_findings
    }

    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn analysis(&self) -> &AnalysisStage {
        &self.analysis
    }

    /// True when any probe did not finish cleanly or analysis degraded
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn integrity_hash(&self) -> &str {
        &self.integrity_hash
    }

    /// Number of probe results with the given status
    pub fn count_status(&self, status: ProbeStatus) -> usize {
        self.probe_results
            .values()
            .filter(|r| r.status == status)
            .count()
    }
}
