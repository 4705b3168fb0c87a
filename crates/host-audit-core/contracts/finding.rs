//! Findings and severities

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Finding severity.
///
/// The ordering is total: `Info < Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, highest first
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// True for the severities that require operator attention
    pub fn is_actionable(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reported issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Stable check identifier, e.g. `ssh.permit_root_login`
    pub check_id: String,

    /// Severity level
    pub severity: Severity,

    /// Human readable description
    pub description: String,

    /// Supporting evidence (observed vs expected values, raw output)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub evidence: serde_json::Value,

    /// Suggested fix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_hint: Option<String>,
}

impl Finding {
    /// Create a new finding without evidence
    pub fn new(
        check_id: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            check_id: check_id.into(),
            severity,
            description: description.into(),
            evidence: serde_json::Value::Null,
            remediation_hint: None,
        }
    }

    /// Attach evidence
    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.evidence = evidence;
        self
    }

    /// Record observed and expected values as evidence
    pub fn with_values(
        mut self,
        current: impl Into<serde_json::Value>,
        expected: impl Into<serde_json::Value>,
    ) -> Self {
        self.evidence = serde_json::json!({
            "current_value": current.into(),
            "expected_value": expected.into(),
        });
        self
    }

    /// Attach a remediation hint
    pub fn with_remediation(mut self, hint: impl Into<String>) -> Self {
        self.remediation_hint = Some(hint.into());
        self
    }

    /// Report ordering: severity descending, then check id ascending
    pub fn report_order(a: &Finding, b: &Finding) -> Ordering {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.check_id.cmp(&b.check_id))
    }

    /// Identity used for deduplication
    pub(crate) fn identity(&self) -> (&str, Severity, &str) {
        (&self.check_id, self.severity, &self.description)
    }
}
