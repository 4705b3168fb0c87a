//! Audit engine
//!
//! Runs registered probes, optionally enriches the findings through the
//! external analysis provider, seals the run and feeds metrics and SLOs.
//! All state is owned per engine instance.

mod registry;
mod scheduler;

pub use registry::ProbeRegistry;
pub use scheduler::*;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::aggregator::{generate_audit_id, merge_findings, HostInfo, ResultAggregator, RunDraft};
use crate::client::{AnalysisProvider, AnalysisRequest, HttpAnalysisClient};
use crate::config::EngineConfig;
use crate::contracts::*;
use crate::error::Result;
use crate::resilience::{
    CircuitBreaker, CircuitState, RateLimiter, ResilienceError, ResilientCaller,
};
use crate::slo::{AlertObserver, SloMonitor, TracingObserver};
use crate::telemetry::{AuditMetricsRegistry, RunSummary};

/// Options for one audit run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditRequest {
    /// Request enrichment from the analysis provider
    pub analyze: bool,
}

impl AuditRequest {
    pub fn with_analysis() -> Self {
        Self { analyze: true }
    }
}

/// Orchestrates scheduling, resilience, aggregation and measurement
pub struct AuditEngine {
    registry: ProbeRegistry,
    scheduler: ExecutionScheduler,
    aggregator: ResultAggregator,
    caller: ResilientCaller,
    analysis: Option<Arc<dyn AnalysisProvider>>,
    slo: Arc<SloMonitor>,
    metrics: AuditMetricsRegistry,
}

impl AuditEngine {
    /// Engine for the local host with the configured provider
    pub fn from_config(config: EngineConfig, registry: ProbeRegistry) -> Result<Self> {
        AuditEngine::builder(config).registry(registry).build()
    }

    pub fn builder(config: EngineConfig) -> AuditEngineBuilder {
        AuditEngineBuilder::new(config)
    }

    /// Execute one audit run
    pub async fn run_audit(&self, request: AuditRequest) -> Result<AuditRun> {
        let started_at = Utc::now();
        let audit_id = generate_audit_id(started_at);
        let start = Instant::now();

        tracing::info!(
            audit_id = %audit_id,
            probes = self.registry.len(),
            analyze = request.analyze,
            "Audit run started"
        );

        let outcome = self.scheduler.execute(self.registry.probes(), &audit_id).await;

        let analysis = if request.analyze {
            let mut keyed = BTreeMap::new();
            for result in &outcome.results {
                keyed
                    .entry(result.probe_name.clone())
                    .or_insert_with(|| result.clone());
            }
            self.analyze(&audit_id, &merge_findings(&keyed)).await
        } else {
            AnalysisStage::NotRequested
        };

        let run = self.aggregator.seal(RunDraft {
            audit_id,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            results: outcome.results,
            analysis,
        })?;

        self.record(&run);

        tracing::info!(
            audit_id = %run.audit_id(),
            duration_ms = run.duration_ms(),
            findings = run.all_findings().len(),
            risk_score = run.risk_score(),
            partial = run.is_partial(),
            "Audit run finished"
        );
        Ok(run)
    }

    async fn analyze(&self, audit_id: &str, findings: &[Finding]) -> AnalysisStage {
        let metrics = self.metrics.metrics();
        let provider = match &self.analysis {
            Some(provider) => provider,
            None => {
                metrics.record_analysis("unconfigured");
                return self.degrade(findings, "analysis provider not configured".to_string());
            }
        };

        let host = self.aggregator.host();
        let request = AnalysisRequest::new(audit_id, &host.hostname, &host.platform, findings);
        let start = Instant::now();
        let result = self.caller.call(|| provider.analyze(&request)).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        match result {
            Ok(report) => {
                metrics.record_analysis("completed");
                self.slo.observe("analysis_latency_ms", latency_ms);
                AnalysisStage::Completed { report }
            }
            Err(ResilienceError::CircuitOpen(e)) => {
                metrics.record_analysis("circuit_open");
                self.degrade(findings, e.to_string())
            }
            Err(ResilienceError::RateLimited(e)) => {
                metrics.record_analysis("rate_limited");
                self.degrade(findings, e.to_string())
            }
            Err(ResilienceError::Operation(e)) => {
                metrics.record_analysis("failed");
                self.slo.observe("analysis_latency_ms", latency_ms);
                self.degrade(findings, e.to_string())
            }
        }
    }

    fn degrade(&self, findings: &[Finding], reason: String) -> AnalysisStage {
        tracing::warn!(reason = %reason, "Analysis degraded, using local fallback report");
        AnalysisStage::Degraded {
            reason,
            fallback: self.aggregator.fallback_report(findings),
        }
    }

    fn record(&self, run: &AuditRun) {
        let metrics = self.metrics.metrics();
        let limiter = self.caller.limiter().stats();
        let breaker = self.caller.breaker().snapshot();

        metrics.record_run(run);
        metrics.sync_rate_limiter(&limiter);
        metrics.sync_circuit_breaker(&breaker);

        let summary = RunSummary::from_run(run);
        self.slo.observe("audit_duration_ms", run.duration_ms() as f64);
        self.slo
            .observe("probe_failure_rate_percent", summary.probe_failure_rate_percent());
        self.slo
            .observe("probe_timeout_count", summary.probes_timed_out as f64);
        self.slo.observe("rate_limit_hits", limiter.total_rejected as f64);
        self.slo
            .observe("circuit_breaker_open_count", breaker.total_opens as f64);
        self.slo.observe("risk_score", run.risk_score() as f64);
    }

    /// Operator reset of the analysis circuit
    pub fn reset_circuit(&self) {
        self.caller.breaker().reset();
        self.metrics
            .metrics()
            .sync_circuit_breaker(&self.caller.breaker().snapshot());
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.caller.breaker().state()
    }

    /// Re-check the integrity hash of a stored run
    pub fn verify(&self, run: &AuditRun) -> Result<()> {
        run.verify_integrity().map_err(|violation| {
            tracing::error!(
                audit_id = %violation.audit_id,
                expected = %violation.expected,
                actual = %violation.actual,
                "Audit run integrity check failed"
            );
            violation.into()
        })
    }

    /// Summary of a run with the current resilience state attached
    pub fn summary(&self, run: &AuditRun) -> RunSummary {
        RunSummary::from_run(run)
            .with_rate_limiter(self.caller.limiter().stats())
            .with_circuit_breaker(self.caller.breaker().snapshot())
    }

    /// Prometheus text of the engine registry
    pub fn metrics_text(&self) -> Result<String> {
        Ok(self.metrics.encode_text()?)
    }

    pub fn metrics(&self) -> &AuditMetricsRegistry {
        &self.metrics
    }

    pub fn slo(&self) -> &Arc<SloMonitor> {
        &self.slo
    }

    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &ExecutionScheduler {
        &self.scheduler
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.caller.limiter()
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        self.caller.breaker()
    }
}

/// Builder for AuditEngine
pub struct AuditEngineBuilder {
    config: EngineConfig,
    registry: ProbeRegistry,
    host: Option<HostInfo>,
    provider: Option<Arc<dyn AnalysisProvider>>,
    observers: Vec<Arc<dyn AlertObserver>>,
}

impl AuditEngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: ProbeRegistry::new(),
            host: None,
            provider: None,
            observers: Vec::new(),
        }
    }

    pub fn registry(mut self, registry: ProbeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Host identity; detected when unset
    pub fn host(mut self, host: HostInfo) -> Self {
        self.host = Some(host);
        self
    }

    /// Analysis provider; overrides `analysis.endpoint` from the config
    pub fn analysis_provider(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn AlertObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> Result<AuditEngine> {
        let config = self.config;
        config.validate()?;

        let host = self.host.unwrap_or_else(HostInfo::detect);
        let metrics = AuditMetricsRegistry::new(&config.telemetry.namespace)?;

        let scheduler =
            ExecutionScheduler::new(config.scheduler).with_metrics(metrics.metrics().clone());
        let caller = ResilientCaller::new(
            Arc::new(RateLimiter::new(config.rate_limit)),
            Arc::new(CircuitBreaker::new(config.circuit_breaker)),
            config.backoff,
        );

        let analysis = self.provider.or_else(|| {
            config.analysis.enabled.then(|| {
                Arc::new(
                    HttpAnalysisClient::new(&config.analysis.endpoint)
                        .with_timeout(Duration::from_millis(config.analysis.timeout_ms)),
                ) as Arc<dyn AnalysisProvider>
            })
        });

        let mut labels = config.telemetry.labels;
        labels
            .entry("hostname".to_string())
            .or_insert_with(|| host.hostname.clone());
        labels
            .entry("platform".to_string())
            .or_insert_with(|| host.platform.clone());

        let slo = Arc::new(SloMonitor::new(config.slo.thresholds).with_labels(labels));
        slo.register_observer(Arc::new(TracingObserver));
        for observer in self.observers {
            slo.register_observer(observer);
        }

        Ok(AuditEngine {
            registry: self.registry,
            scheduler,
            aggregator: ResultAggregator::new(config.aggregator, host),
            caller,
            analysis,
            slo,
            metrics,
        })
    }
}
