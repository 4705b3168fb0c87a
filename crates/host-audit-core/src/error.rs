//! Error types for the audit engine
//!
//! Probe-local failures never surface here; they are folded into the
//! affected `ProbeResult`. These errors are what callers of the engine see.

use thiserror::Error;

use crate::contracts::{IntegrityViolation, ProbeError};
use crate::resilience::{CircuitOpenError, RateLimitExceeded};
use crate::telemetry::TelemetryError;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum AuditError {
    /// A probe failed outside the scheduler's isolation boundary
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Operation exceeded its time allowance
    #[error("Timed out: {probe} after {timeout_ms}ms")]
    Timeout { probe: String, timeout_ms: u64 },

    /// External call rejected by the rate limiter
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    /// External call rejected by the circuit breaker
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// Stored and recomputed hashes of a run differ
    #[error(transparent)]
    IntegrityViolation(#[from] IntegrityViolation),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File access or I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics registry error
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

impl AuditError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AuditError::Config(msg.into())
    }

    /// Errors that mean a stored result cannot be trusted
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, AuditError::IntegrityViolation(_))
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for AuditError {
    fn from(err: serde_yaml::Error) -> Self {
        AuditError::Serialization(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for AuditError {
    fn from(err: toml::de::Error) -> Self {
        AuditError::Serialization(format!("TOML error: {}", err))
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AuditError>;
