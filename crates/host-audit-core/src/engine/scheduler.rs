//! Probe execution scheduler
//!
//! Every registered probe yields exactly one [`ProbeResult`]. Probe errors,
//! panics and timeouts are converted at the call boundary and never abort
//! sibling probes or the run.

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

use super::ProbeRegistry;
use crate::aggregator::{generate_audit_id, ResultAggregator, RunDraft};
use crate::contracts::*;
use crate::error::Result;
use crate::telemetry::AuditMetrics;

/// How probes are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Parallel,
    Sequential,
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parallel" => Ok(ExecutionMode::Parallel),
            "sequential" => Ok(ExecutionMode::Sequential),
            other => Err(format!("unknown execution mode: {}", other)),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub mode: ExecutionMode,

    /// Probes running at once in parallel mode
    pub max_concurrency: usize,

    /// Overrides every probe's own default timeout when set
    pub per_probe_timeout_ms: Option<u64>,

    /// Wall time allowed for the whole run
    pub global_timeout_ms: u64,

    /// Report privileged probes on a non-elevated host as errors instead of partial
    pub require_elevated: bool,

    /// Force the elevation check; detected from the process when unset
    pub elevated: Option<bool>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            max_concurrency: 4,
            per_probe_timeout_ms: None,
            global_timeout_ms: 300_000,
            require_elevated: false,
            elevated: None,
        }
    }
}

impl SchedulerConfig {
    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be at least 1".to_string());
        }
        if self.global_timeout_ms == 0 {
            return Err("global_timeout_ms must be greater than 0".to_string());
        }
        if self.per_probe_timeout_ms == Some(0) {
            return Err("per_probe_timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Raw scheduler output, one result per probe in registration order
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub results: Vec<ProbeResult>,
    pub deadline_hit: bool,
    pub elapsed: Duration,
}

/// Dispatches probes under per-probe and global time limits
#[derive(Clone)]
pub struct ExecutionScheduler {
    config: SchedulerConfig,
    elevated: bool,
    metrics: Option<AuditMetrics>,
}

impl ExecutionScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let elevated = config.elevated.unwrap_or_else(detect_elevated);
        Self {
            config,
            elevated,
            metrics: None,
        }
    }

    /// Track in-flight probes on the given metrics
    pub fn with_metrics(mut self, metrics: AuditMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    /// Execute every registered probe and seal the run
    pub async fn run(&self, registry: &ProbeRegistry, aggregator: &ResultAggregator) -> Result<AuditRun> {
        let started_at = Utc::now();
        let audit_id = generate_audit_id(started_at);
        let outcome = self.execute(registry.probes(), &audit_id).await;

        aggregator.seal(RunDraft {
            audit_id,
            started_at,
            duration_ms: outcome.elapsed.as_millis() as u64,
            results: outcome.results,
            analysis: AnalysisStage::NotRequested,
        })
    }

    /// Execute probes and collect one result per probe
    pub async fn execute(&self, probes: &[Arc<dyn Probe>], audit_id: &str) -> ScheduleOutcome {
        let start = Instant::now();
        let deadline = start + self.config.global_timeout();

        tracing::info!(
            audit_id = %audit_id,
            probes = probes.len(),
            mode = ?self.config.mode,
            elevated = self.elevated,
            "Starting probe execution"
        );

        let (results, deadline_hit) = match self.config.mode {
            ExecutionMode::Parallel => self.execute_parallel(probes, audit_id, deadline).await,
            ExecutionMode::Sequential => self.execute_sequential(probes, audit_id, deadline).await,
        };

        let elapsed = start.elapsed();
        if deadline_hit {
            tracing::warn!(
                audit_id = %audit_id,
                global_timeout_ms = self.config.global_timeout_ms,
                "Global timeout reached, run finalized with outstanding probes"
            );
        }
        tracing::info!(
            audit_id = %audit_id,
            elapsed_ms = elapsed.as_millis() as u64,
            "Probe execution finished"
        );

        ScheduleOutcome {
            results,
            deadline_hit,
            elapsed,
        }
    }

    async fn execute_parallel(
        &self,
        probes: &[Arc<dyn Probe>],
        audit_id: &str,
        deadline: Instant,
    ) -> (Vec<ProbeResult>, bool) {
        let root = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut slots: Vec<Option<ProbeResult>> = vec![None; probes.len()];
        let mut started: Vec<Arc<OnceLock<Instant>>> = Vec::with_capacity(probes.len());
        let mut tasks = JoinSet::new();

        for (idx, probe) in probes.iter().enumerate() {
            let started_at = Arc::new(OnceLock::new());
            started.push(Arc::clone(&started_at));

            if let Some(skipped) = self.gate(probe.as_ref()) {
                slots[idx] = Some(skipped);
                continue;
            }

            let probe = Arc::clone(probe);
            let semaphore = Arc::clone(&semaphore);
            let token = root.child_token();
            let audit_id = audit_id.to_string();
            let limit = self.timeout_for(probe.as_ref());
            let elevated = self.elevated;
            let metrics = self.metrics.clone();

            tasks.spawn(async move {
                let _slot = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (idx, ProbeResult::pending(probe.name())),
                };
                let now = Instant::now();
                let _ = started_at.set(now);
                let ctx = ProbeContext::new(audit_id, token, now + limit, elevated);
                (idx, run_probe(probe.as_ref(), ctx, limit, metrics.as_ref()).await)
            });
        }

        let global = sleep_until(deadline);
        tokio::pin!(global);
        let mut deadline_hit = false;

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((idx, result))) => slots[idx] = Some(result),
                    Some(Err(e)) => tracing::error!(error = %e, "Probe task terminated abnormally"),
                    None => break,
                },
                _ = &mut global => {
                    deadline_hit = true;
                    break;
                }
            }
        }

        if deadline_hit {
            root.cancel();
            tasks.abort_all();
        }

        let stopped = Instant::now();
        let results = slots
            .into_iter()
            .zip(probes)
            .zip(started)
            .map(|((slot, probe), started_at)| match (slot, started_at.get()) {
                (Some(result), _) => result,
                (None, _) if !deadline_hit => {
                    ProbeResult::failed(probe.name(), "probe task terminated abnormally", 0)
                }
                (None, Some(at)) => ProbeResult::timed_out(
                    probe.name(),
                    "Global timeout reached before the probe returned",
                    stopped.saturating_duration_since(*at).as_millis() as u64,
                ),
                (None, None) => ProbeResult::pending(probe.name()),
            })
            .collect();

        (results, deadline_hit)
    }

    async fn execute_sequential(
        &self,
        probes: &[Arc<dyn Probe>],
        audit_id: &str,
        deadline: Instant,
    ) -> (Vec<ProbeResult>, bool) {
        let root = CancellationToken::new();
        let mut results = Vec::with_capacity(probes.len());
        let mut deadline_hit = false;

        for probe in probes {
            if let Some(skipped) = self.gate(probe.as_ref()) {
                results.push(skipped);
                continue;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if deadline_hit || remaining.is_zero() {
                deadline_hit = true;
                results.push(ProbeResult::pending(probe.name()));
                continue;
            }

            let own = self.timeout_for(probe.as_ref());
            let limit = own.min(remaining);
            let ctx = ProbeContext::new(audit_id, root.child_token(), Instant::now() + limit, self.elevated);
            let result = run_probe(probe.as_ref(), ctx, limit, self.metrics.as_ref()).await;

            if limit < own && result.status == ProbeStatus::Timeout {
                deadline_hit = true;
            }
            results.push(result);
        }

        if deadline_hit {
            root.cancel();
        }
        (results, deadline_hit)
    }

    fn timeout_for(&self, probe: &dyn Probe) -> Duration {
        self.config
            .per_probe_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| probe.default_timeout())
    }

    fn gate(&self, probe: &dyn Probe) -> Option<ProbeResult> {
        if probe.requires_elevated_privilege() && !self.elevated {
            tracing::warn!(
                probe = %probe.name(),
                required = self.config.require_elevated,
                "Skipping probe: requires elevated privileges"
            );
            Some(ProbeResult::skipped_privileged(
                probe.name(),
                self.config.require_elevated,
            ))
        } else {
            None
        }
    }
}

/// Run one probe under its time limit, converting every failure mode
async fn run_probe(
    probe: &dyn Probe,
    ctx: ProbeContext,
    limit: Duration,
    metrics: Option<&AuditMetrics>,
) -> ProbeResult {
    let name = probe.name().to_string();
    let token = ctx.token().clone();
    let _active = metrics.map(AuditMetrics::track_active_probe);
    let start = Instant::now();

    let outcome = timeout(limit, AssertUnwindSafe(probe.execute(ctx)).catch_unwind()).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(Ok(outcome))) => {
            tracing::debug!(probe = %name, elapsed_ms, "Probe completed");
            ProbeResult::from_outcome(name, outcome, elapsed_ms)
        }
        Ok(Ok(Err(e))) => {
            tracing::warn!(probe = %name, error = %e, "Probe failed");
            ProbeResult::failed(name, e.to_string(), elapsed_ms)
        }
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            tracing::warn!(probe = %name, panic = %message, "Probe panicked");
            ProbeResult::failed(name, format!("probe panicked: {}", message), elapsed_ms)
        }
        Err(_) => {
            token.cancel();
            tracing::warn!(probe = %name, timeout_ms = limit.as_millis() as u64, "Probe timed out");
            ProbeResult::timed_out(
                name,
                format!("Probe timed out after {}ms", limit.as_millis()),
                elapsed_ms,
            )
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(unix)]
fn detect_elevated() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn detect_elevated() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{AggregatorConfig, HostInfo};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct SleepProbe {
        name: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl Probe for SleepProbe {
        fn name(&self) -> &str {
            self.name
        }

        async fn execute(&self, _ctx: ProbeContext) -> std::result::Result<ProbeOutcome, ProbeError> {
            tokio::time::sleep(self.delay).await;
            Ok(ProbeOutcome::ok(serde_json::json!({ "slept_ms": self.delay.as_millis() as u64 })))
        }
    }

    struct FailingProbe;

    #[async_trait]
    impl Probe for FailingProbe {
        fn name(&self) -> &str {
            "failing"
        }

        async fn execute(&self, _ctx: ProbeContext) -> std::result::Result<ProbeOutcome, ProbeError> {
            Err(ProbeError::failed("cannot read /etc/shadow"))
        }
    }

    struct PanickingProbe;

    #[async_trait]
    impl Probe for PanickingProbe {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn execute(&self, _ctx: ProbeContext) -> std::result::Result<ProbeOutcome, ProbeError> {
            panic!("index out of bounds")
        }
    }

    struct CooperativeProbe {
        observed_cancel: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Probe for CooperativeProbe {
        fn name(&self) -> &str {
            "cooperative"
        }

        fn default_timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn execute(&self, ctx: ProbeContext) -> std::result::Result<ProbeOutcome, ProbeError> {
            let flag = Arc::clone(&self.observed_cancel);
            let token = ctx.token().clone();
            tokio::spawn(async move {
                token.cancelled().await;
                flag.store(true, Ordering::SeqCst);
            });
            ctx.cancelled().await;
            Err(ProbeError::Cancelled)
        }
    }

    struct PrivilegedProbe;

    #[async_trait]
    impl Probe for PrivilegedProbe {
        fn name(&self) -> &str {
            "shadow"
        }

        fn requires_elevated_privilege(&self) -> bool {
            true
        }

        async fn execute(&self, _ctx: ProbeContext) -> std::result::Result<ProbeOutcome, ProbeError> {
            Ok(ProbeOutcome::ok(serde_json::Value::Null))
        }
    }

    struct CountingProbe {
        name: String,
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Probe for CountingProbe {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(&self, _ctx: ProbeContext) -> std::result::Result<ProbeOutcome, ProbeError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(ProbeOutcome::default())
        }
    }

    fn scheduler(mode: ExecutionMode, per_probe_ms: Option<u64>, global_ms: u64) -> ExecutionScheduler {
        ExecutionScheduler::new(SchedulerConfig {
            mode,
            max_concurrency: 4,
            per_probe_timeout_ms: per_probe_ms,
            global_timeout_ms: global_ms,
            require_elevated: false,
            elevated: Some(false),
        })
    }

    fn sleeper(name: &'static str, secs: u64) -> Arc<dyn Probe> {
        Arc::new(SleepProbe {
            name,
            delay: Duration::from_secs(secs),
        })
    }

    fn status_of(results: &[ProbeResult], name: &str) -> ProbeStatus {
        results
            .iter()
            .find(|r| r.probe_name == name)
            .map(|r| r.status)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_isolated() {
        let probes: Vec<Arc<dyn Probe>> = vec![
            Arc::new(FailingProbe),
            Arc::new(PanickingProbe),
            sleeper("slow", 60),
            sleeper("fast", 1),
        ];
        let outcome = scheduler(ExecutionMode::Parallel, Some(5_000), 300_000)
            .execute(&probes, "test")
            .await;

        assert_eq!(outcome.results.len(), 4);
        assert!(!outcome.deadline_hit);
        assert_eq!(status_of(&outcome.results, "failing"), ProbeStatus::Error);
        assert_eq!(status_of(&outcome.results, "panicking"), ProbeStatus::Error);
        assert_eq!(status_of(&outcome.results, "slow"), ProbeStatus::Timeout);
        assert_eq!(status_of(&outcome.results, "fast"), ProbeStatus::Ok);

        let panicked = &outcome.results[1];
        assert_eq!(panicked.findings[0].check_id, "panicking.execution_error");
        assert!(panicked.findings[0].evidence["error"]
            .as_str()
            .unwrap()
            .contains("index out of bounds"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_timeout_parallel() {
        let probes: Vec<Arc<dyn Probe>> = vec![sleeper("forever", 3_600), sleeper("quick", 1)];
        let outcome = scheduler(ExecutionMode::Parallel, Some(7_200_000), 10_000)
            .execute(&probes, "test")
            .await;

        assert!(outcome.deadline_hit);
        assert_eq!(outcome.elapsed, Duration::from_secs(10));
        assert_eq!(status_of(&outcome.results, "forever"), ProbeStatus::Timeout);
        assert_eq!(status_of(&outcome.results, "quick"), ProbeStatus::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_timeout_leaves_unstarted_pending() {
        let mut scheduler = scheduler(ExecutionMode::Parallel, Some(7_200_000), 10_000);
        scheduler.config.max_concurrency = 1;
        let probes: Vec<Arc<dyn Probe>> = vec![sleeper("first", 3_600), sleeper("second", 1)];

        let outcome = scheduler.execute(&probes, "test").await;
        assert_eq!(status_of(&outcome.results, "first"), ProbeStatus::Timeout);
        assert_eq!(status_of(&outcome.results, "second"), ProbeStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_timeout_reports_time_since_start() {
        let mut scheduler = scheduler(ExecutionMode::Parallel, Some(7_200_000), 10_000);
        scheduler.config.max_concurrency = 1;
        let probes: Vec<Arc<dyn Probe>> = vec![sleeper("first", 4), sleeper("second", 3_600)];

        let outcome = scheduler.execute(&probes, "test").await;
        assert_eq!(status_of(&outcome.results, "first"), ProbeStatus::Ok);

        // waited 4s for the only worker slot
        let late = &outcome.results[1];
        assert_eq!(late.status, ProbeStatus::Timeout);
        assert_eq!(late.execution_time_ms, 6_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_order_and_pending() {
        let probes: Vec<Arc<dyn Probe>> = vec![
            sleeper("a", 4),
            sleeper("b", 4),
            sleeper("c", 4),
            sleeper("d", 4),
        ];
        let outcome = scheduler(ExecutionMode::Sequential, None, 10_000)
            .execute(&probes, "test")
            .await;

        let statuses: Vec<ProbeStatus> = outcome.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                ProbeStatus::Ok,
                ProbeStatus::Ok,
                ProbeStatus::Timeout,
                ProbeStatus::Pending
            ]
        );
        assert!(outcome.deadline_hit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let probes: Vec<Arc<dyn Probe>> = (0..10)
            .map(|i| {
                Arc::new(CountingProbe {
                    name: format!("p{}", i),
                    current: Arc::clone(&current),
                    peak: Arc::clone(&peak),
                }) as Arc<dyn Probe>
            })
            .collect();

        let mut scheduler = scheduler(ExecutionMode::Parallel, None, 60_000);
        scheduler.config.max_concurrency = 3;
        let outcome = scheduler.execute(&probes, "test").await;

        assert_eq!(outcome.results.len(), 10);
        assert!(outcome.results.iter().all(|r| r.status == ProbeStatus::Ok));
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_probe_token() {
        let observed = Arc::new(AtomicBool::new(false));
        let probes: Vec<Arc<dyn Probe>> = vec![Arc::new(CooperativeProbe {
            observed_cancel: Arc::clone(&observed),
        })];

        let outcome = scheduler(ExecutionMode::Parallel, None, 60_000)
            .execute(&probes, "test")
            .await;
        assert_eq!(outcome.results[0].status, ProbeStatus::Timeout);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_privilege_gating() {
        let probes: Vec<Arc<dyn Probe>> = vec![Arc::new(PrivilegedProbe)];

        let outcome = scheduler(ExecutionMode::Parallel, None, 1_000)
            .execute(&probes, "test")
            .await;
        assert_eq!(outcome.results[0].status, ProbeStatus::Partial);

        let strict = ExecutionScheduler::new(SchedulerConfig {
            require_elevated: true,
            elevated: Some(false),
            ..Default::default()
        });
        let outcome = strict.execute(&probes, "test").await;
        assert_eq!(outcome.results[0].status, ProbeStatus::Error);

        let root = ExecutionScheduler::new(SchedulerConfig {
            elevated: Some(true),
            ..Default::default()
        });
        let outcome = root.execute(&probes, "test").await;
        assert_eq!(outcome.results[0].status, ProbeStatus::Ok);
    }

    #[tokio::test]
    async fn test_empty_probe_list() {
        let outcome = scheduler(ExecutionMode::Parallel, None, 1_000)
            .execute(&[], "test")
            .await;
        assert!(outcome.results.is_empty());
        assert!(!outcome.deadline_hit);
    }

    fn aggregator() -> ResultAggregator {
        ResultAggregator::new(AggregatorConfig::default(), HostInfo::fixed("web-1", "linux", "6.1"))
    }

    fn registry(probes: Vec<Arc<dyn Probe>>) -> ProbeRegistry {
        let mut registry = ProbeRegistry::new();
        for probe in probes {
            registry.register_arc(probe).unwrap();
        }
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_seals_one_result_per_probe() {
        let registry = registry(vec![
            Arc::new(FailingProbe),
            Arc::new(PanickingProbe),
            sleeper("fast", 1),
        ]);
        let run = scheduler(ExecutionMode::Parallel, Some(5_000), 300_000)
            .run(&registry, &aggregator())
            .await
            .unwrap();

        assert_eq!(run.probe_results().len(), 3);
        assert_eq!(run.probe_result("failing").unwrap().status, ProbeStatus::Error);
        assert_eq!(run.probe_result("panicking").unwrap().status, ProbeStatus::Error);
        assert_eq!(run.probe_result("fast").unwrap().status, ProbeStatus::Ok);
        assert!(run.is_partial());
        assert!(matches!(run.analysis(), AnalysisStage::NotRequested));
        assert!(run.verify_integrity().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_all_failing_and_empty() {
        let registry = registry(vec![Arc::new(FailingProbe), Arc::new(PanickingProbe)]);
        let run = scheduler(ExecutionMode::Sequential, None, 60_000)
            .run(&registry, &aggregator())
            .await
            .unwrap();
        assert_eq!(run.probe_results().len(), 2);
        assert_eq!(run.count_status(ProbeStatus::Error), 2);
        assert!(run.verify_integrity().is_ok());

        let run = scheduler(ExecutionMode::Parallel, None, 60_000)
            .run(&ProbeRegistry::new(), &aggregator())
            .await
            .unwrap();
        assert!(run.probe_results().is_empty());
        assert_eq!(run.risk_score(), 0);
        assert!(run.verify_integrity().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(SchedulerConfig::default().validate().is_ok());
        let config = SchedulerConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = SchedulerConfig {
            per_probe_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
