//! Probe capability contract and per-probe results

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::{Finding, Severity};

/// Default per-probe timeout when a probe does not declare one
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors a probe may return from `execute`
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    #[error("Probe failed: {0}")]
    Failed(String),

    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Probe cancelled")]
    Cancelled,
}

impl ProbeError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ProbeError::Failed(msg.into())
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => ProbeError::PermissionDenied(err.to_string()),
            _ => ProbeError::Failed(err.to_string()),
        }
    }
}

/// Execution context handed to every probe invocation.
///
/// Probes are expected to poll [`ProbeContext::is_cancelled`] or select on
/// [`ProbeContext::cancelled`] between units of work.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    audit_id: String,
    cancellation: CancellationToken,
    deadline: Instant,
    elevated: bool,
}

impl ProbeContext {
    pub fn new(
        audit_id: impl Into<String>,
        cancellation: CancellationToken,
        deadline: Instant,
        elevated: bool,
    ) -> Self {
        Self {
            audit_id: audit_id.into(),
            cancellation,
            deadline,
            elevated,
        }
    }

    pub fn audit_id(&self) -> &str {
        &self.audit_id
    }

    /// Whether the host process runs with elevated privileges
    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the scheduler withdraws this invocation
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancellation.cancelled()
    }

    /// Time left before this invocation is abandoned
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Capability every probe implements.
///
/// Probes share no mutable state with each other and must not coordinate.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Unique probe name, used as the result key
    fn name(&self) -> &str;

    /// Whether the probe needs root/administrator rights
    fn requires_elevated_privilege(&self) -> bool {
        false
    }

    /// Timeout used when the run does not override it
    fn default_timeout(&self) -> Duration {
        DEFAULT_PROBE_TIMEOUT
    }

    /// Collect data and report findings
    async fn execute(&self, ctx: ProbeContext) -> Result<ProbeOutcome, ProbeError>;
}

/// Probe execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Ok,
    Partial,
    Error,
    Timeout,
    Pending,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Ok => "ok",
            ProbeStatus::Partial => "partial",
            ProbeStatus::Error => "error",
            ProbeStatus::Timeout => "timeout",
            ProbeStatus::Pending => "pending",
        }
    }

    /// Statuses counted as probe failures
    pub fn is_failure(&self) -> bool {
        matches!(self, ProbeStatus::Error | ProbeStatus::Timeout)
    }
}

/// What a probe returns on success
#[derive(Debug, Clone, Default)]
pub struct ProbeOutcome {
    pub partial: bool,
    pub data: serde_json::Value,
    pub findings: Vec<Finding>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ProbeOutcome {
    /// Complete outcome with collected data
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    /// Outcome where only part of the checks could run
    pub fn partial(data: serde_json::Value, reason: impl Into<String>) -> Self {
        Self {
            partial: true,
            data,
            warnings: vec![reason.into()],
            ..Default::default()
        }
    }

    pub fn with_finding(mut self, finding: Finding) -> Self {
        self.findings.push(finding);
        self
    }

    pub fn with_findings(mut self, findings: impl IntoIterator<Item = Finding>) -> Self {
        self.findings.extend(findings);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }
}

/// Result of one probe within one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Probe name
    pub probe_name: String,

    /// Execution status
    pub status: ProbeStatus,

    /// Collected data
    #[serde(default)]
    pub data: serde_json::Value,

    /// Findings reported by the probe
    #[serde(default)]
    pub findings: Vec<Finding>,

    /// Errors encountered
    #[serde(default)]
    pub errors: Vec<String>,

    /// Warnings encountered
    #[serde(default)]
    pub warnings: Vec<String>,

    /// Wall time spent in the probe
    pub execution_time_ms: u64,
}

impl ProbeResult {
    /// Build from a probe's own outcome
    pub fn from_outcome(name: impl Into<String>, outcome: ProbeOutcome, elapsed_ms: u64) -> Self {
        Self {
            probe_name: name.into(),
            status: if outcome.partial {
                ProbeStatus::Partial
            } else {
                ProbeStatus::Ok
            },
            data: outcome.data,
            findings: outcome.findings,
            errors: outcome.errors,
            warnings: outcome.warnings,
            execution_time_ms: elapsed_ms,
        }
    }

    /// Probe raised an error or panicked; the cause is kept as evidence
    pub fn failed(name: impl Into<String>, cause: impl Into<String>, elapsed_ms: u64) -> Self {
        let name = name.into();
        let cause = cause.into();
        let evidence = Finding::new(
            format!("{}.execution_error", name),
            Severity::Info,
            format!("Probe {} did not complete", name),
        )
        .with_evidence(serde_json::json!({ "error": cause }));

        Self {
            probe_name: name,
            status: ProbeStatus::Error,
            data: serde_json::Value::Null,
            findings: vec![evidence],
            errors: vec![cause],
            warnings: Vec::new(),
            execution_time_ms: elapsed_ms,
        }
    }

    /// Probe exceeded its time allowance
    pub fn timed_out(name: impl Into<String>, reason: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            probe_name: name.into(),
            status: ProbeStatus::Timeout,
            data: serde_json::Value::Null,
            findings: Vec::new(),
            errors: vec![reason.into()],
            warnings: Vec::new(),
            execution_time_ms: elapsed_ms,
        }
    }

    /// Probe never started before the run was finalized
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            probe_name: name.into(),
            status: ProbeStatus::Pending,
            data: serde_json::Value::Null,
            findings: Vec::new(),
            errors: Vec::new(),
            warnings: vec!["Probe was not started before the run was finalized".to_string()],
            execution_time_ms: 0,
        }
    }

    /// Probe was not executed because it needs privileges the process lacks
    pub fn skipped_privileged(name: impl Into<String>, required: bool) -> Self {
        let name = name.into();
        if required {
            let mut result = Self::failed(&name, "requires elevated privileges", 0);
            result.findings.clear();
            result
        } else {
            Self {
                probe_name: name,
                status: ProbeStatus::Partial,
                data: serde_json::Value::Null,
                findings: Vec::new(),
                errors: Vec::new(),
                warnings: vec!["Checks skipped: requires elevated privileges".to_string()],
                execution_time_ms: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_status_mapping() {
        let ok = ProbeResult::from_outcome("users", ProbeOutcome::ok(serde_json::json!({"n": 3})), 12);
        assert_eq!(ok.status, ProbeStatus::Ok);
        assert_eq!(ok.execution_time_ms, 12);

        let partial = ProbeResult::from_outcome(
            "users",
            ProbeOutcome::partial(serde_json::Value::Null, "shadow file unreadable"),
            5,
        );
        assert_eq!(partial.status, ProbeStatus::Partial);
        assert_eq!(partial.warnings.len(), 1);
    }

    #[test]
    fn test_failed_keeps_evidence() {
        let result = ProbeResult::failed("network", "socket closed", 7);

        assert_eq!(result.status, ProbeStatus::Error);
        assert_eq!(result.errors, vec!["socket closed".to_string()]);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].check_id, "network.execution_error");
        assert_eq!(result.findings[0].severity, Severity::Info);
        assert_eq!(result.findings[0].evidence["error"], "socket closed");
    }

    #[test]
    fn test_skipped_privileged() {
        let strict = ProbeResult::skipped_privileged("kernel", true);
        assert_eq!(strict.status, ProbeStatus::Error);
        assert!(strict.findings.is_empty());

        let lenient = ProbeResult::skipped_privileged("kernel", false);
        assert_eq!(lenient.status, ProbeStatus::Partial);
        assert!(!lenient.warnings.is_empty());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: ProbeError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "/etc/shadow").into();
        assert!(matches!(err, ProbeError::PermissionDenied(_)));
    }

    #[test]
    fn test_failure_statuses() {
        assert!(ProbeStatus::Error.is_failure());
        assert!(ProbeStatus::Timeout.is_failure());
        assert!(!ProbeStatus::Partial.is_failure());
        assert!(!ProbeStatus::Pending.is_failure());
    }
}
