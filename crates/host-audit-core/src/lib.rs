//! Host Audit Engine
//!
//! Schedules host probes under per-probe and global time limits, protects
//! the external analysis dependency with a rate limiter and a circuit
//! breaker, aggregates results into a tamper-evident audit run and tracks
//! service level objectives over the engine's own metrics.
//!
//! # Guarantees
//! - Isolation: a failing, panicking or hanging probe never affects its siblings
//! - Completeness: every scheduled probe has exactly one result
//! - Determinism: findings order and integrity hash do not depend on completion order

pub mod aggregator;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod resilience;
pub mod slo;
pub mod telemetry;

// Re-export contracts
#[path = "../contracts/mod.rs"]
pub mod contracts;

pub use contracts::*;

pub use aggregator::{HostInfo, ResultAggregator};
pub use client::{AnalysisError, AnalysisProvider, AnalysisRequest, HttpAnalysisClient};
pub use config::EngineConfig;
pub use engine::{AuditEngine, AuditRequest, ExecutionMode, ExecutionScheduler, ProbeRegistry};
pub use error::{AuditError, Result};
pub use slo::{Alert, SloMonitor, SloThreshold};
