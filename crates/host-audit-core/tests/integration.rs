//! Integration tests for the host audit engine

use async_trait::async_trait;
use host_audit_core::config::AnalysisConfig;
use host_audit_core::contracts::*;
use host_audit_core::engine::{AuditEngine, AuditRequest, ExecutionMode, ProbeRegistry};
use host_audit_core::{AuditError, EngineConfig, HostInfo};
use std::io::Write;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

enum Behavior {
    Fail,
    Panic,
    Hang,
    Report(Vec<Finding>),
}

struct ScriptedProbe {
    name: &'static str,
    behavior: Behavior,
}

#[async_trait]
impl Probe for ScriptedProbe {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, ctx: ProbeContext) -> Result<ProbeOutcome, ProbeError> {
        match &self.behavior {
            Behavior::Fail => Err(ProbeError::PermissionDenied("/etc/shadow".to_string())),
            Behavior::Panic => panic!("unexpected kernel response"),
            Behavior::Hang => {
                ctx.cancelled().await;
                Err(ProbeError::Cancelled)
            }
            Behavior::Report(findings) => {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(ProbeOutcome::ok(serde_json::json!({ "checked": findings.len() }))
                    .with_findings(findings.clone()))
            }
        }
    }
}

fn probe(name: &'static str, behavior: Behavior) -> ScriptedProbe {
    ScriptedProbe { name, behavior }
}

fn engine_with(config: EngineConfig, probes: Vec<ScriptedProbe>) -> AuditEngine {
    let mut registry = ProbeRegistry::new();
    for p in probes {
        registry.register(p).unwrap();
    }
    AuditEngine::builder(config)
        .registry(registry)
        .host(HostInfo::fixed("db-7", "linux", "6.8.0"))
        .build()
        .unwrap()
}

fn config(mode: ExecutionMode, per_probe_ms: u64, global_ms: u64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.scheduler.mode = mode;
    config.scheduler.per_probe_timeout_ms = Some(per_probe_ms);
    config.scheduler.global_timeout_ms = global_ms;
    config.scheduler.elevated = Some(true);
    config
}

#[tokio::test(start_paused = true)]
async fn test_mixed_failures_produce_complete_run() {
    let engine = engine_with(
        config(ExecutionMode::Parallel, 5_000, 300_000),
        vec![
            probe("accounts", Behavior::Fail),
            probe("kernel", Behavior::Panic),
            probe("packages", Behavior::Hang),
            probe(
                "ssh",
                Behavior::Report(vec![Finding::new(
                    "ssh.password_auth",
                    Severity::High,
                    "Password authentication enabled",
                )]),
            ),
            probe(
                "firewall",
                Behavior::Report(vec![Finding::new(
                    "fw.disabled",
                    Severity::Critical,
                    "Host firewall disabled",
                )]),
            ),
        ],
    );

    let run = engine.run_audit(AuditRequest::default()).await.unwrap();

    assert_eq!(run.probe_results().len(), 5);
    assert_eq!(run.probe_result("accounts").unwrap().status, ProbeStatus::Error);
    assert_eq!(run.probe_result("kernel").unwrap().status, ProbeStatus::Error);
    assert_eq!(run.probe_result("packages").unwrap().status, ProbeStatus::Timeout);
    assert_eq!(run.probe_result("ssh").unwrap().status, ProbeStatus::Ok);
    assert_eq!(run.probe_result("firewall").unwrap().status, ProbeStatus::Ok);
    assert!(run.is_partial());

    // Error evidence findings are informational and sort last
    let ids: Vec<&str> = run.all_findings().iter().map(|f| f.check_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "fw.disabled",
            "ssh.password_auth",
            "accounts.execution_error",
            "kernel.execution_error",
        ]
    );
    assert_eq!(run.risk_score(), 77);
    assert_eq!(run.risk_level(), RiskLevel::Critical);
    assert!(engine.verify(&run).is_ok());

    let metrics = engine.metrics_text().unwrap();
    assert!(metrics.contains("probe=\"packages\",status=\"timeout\""));
    assert_eq!(engine.slo().latest("probe_failure_rate_percent"), Some(60.0));
}

#[tokio::test(start_paused = true)]
async fn test_global_timeout_finalizes_run() {
    let engine = engine_with(
        config(ExecutionMode::Parallel, 3_600_000, 10_000),
        vec![
            probe("stuck", Behavior::Hang),
            probe("users", Behavior::Report(vec![])),
        ],
    );

    let started = tokio::time::Instant::now();
    let run = engine.run_audit(AuditRequest::default()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(11));
    assert_eq!(run.probe_result("stuck").unwrap().status, ProbeStatus::Timeout);
    assert_eq!(run.probe_result("users").unwrap().status, ProbeStatus::Ok);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_global_timeout_marks_rest_pending() {
    let engine = engine_with(
        config(ExecutionMode::Sequential, 60_000, 10_000),
        vec![
            probe("first", Behavior::Hang),
            probe("second", Behavior::Report(vec![])),
            probe("third", Behavior::Report(vec![])),
        ],
    );

    let run = engine.run_audit(AuditRequest::default()).await.unwrap();

    assert_eq!(run.probe_result("first").unwrap().status, ProbeStatus::Timeout);
    assert_eq!(run.probe_result("second").unwrap().status, ProbeStatus::Pending);
    assert_eq!(run.probe_result("third").unwrap().status, ProbeStatus::Pending);
    assert_eq!(run.count_status(ProbeStatus::Pending), 2);
}

#[tokio::test]
async fn test_empty_registry() {
    let engine = engine_with(config(ExecutionMode::Parallel, 1_000, 5_000), vec![]);
    let run = engine.run_audit(AuditRequest::default()).await.unwrap();

    assert!(run.probe_results().is_empty());
    assert!(run.all_findings().is_empty());
    assert_eq!(run.risk_score(), 0);
    assert!(!run.is_partial());
    assert!(engine.verify(&run).is_ok());
}

#[tokio::test]
async fn test_tampered_run_detected() {
    let engine = engine_with(
        config(ExecutionMode::Parallel, 1_000, 5_000),
        vec![probe(
            "ssh",
            Behavior::Report(vec![Finding::new("ssh.root_login", Severity::Critical, "Root login")]),
        )],
    );
    let run = engine.run_audit(AuditRequest::default()).await.unwrap();

    let mut exported = serde_json::to_value(&run).unwrap();
    exported["all_findings"] = serde_json::json!([]);
    let tampered: AuditRun = serde_json::from_value(exported).unwrap();

    let err = engine.verify(&tampered).unwrap_err();
    assert!(err.is_integrity_failure());
    match err {
        AuditError::IntegrityViolation(v) => {
            assert_eq!(v.expected, run.integrity_hash());
            assert_ne!(v.actual, v.expected);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // Untouched round trip still verifies
    let json = serde_json::to_string(&run).unwrap();
    let restored: AuditRun = serde_json::from_str(&json).unwrap();
    assert!(engine.verify(&restored).is_ok());
}

#[tokio::test]
async fn test_http_analysis_from_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "risk_score": 65,
            "executive_summary": "Password authentication should be disabled",
            "critical_issues": ["ssh.password_auth"],
            "recommendations": ["Use key based authentication"],
            "provider": "analysis-service"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(ExecutionMode::Parallel, 1_000, 5_000);
    config.analysis = AnalysisConfig {
        enabled: true,
        endpoint: server.uri(),
        timeout_ms: 2_000,
    };
    let engine = engine_with(
        config,
        vec![probe(
            "ssh",
            Behavior::Report(vec![Finding::new("ssh.password_auth", Severity::High, "Enabled")]),
        )],
    );

    let run = engine.run_audit(AuditRequest::with_analysis()).await.unwrap();
    let report = match run.analysis() {
        AnalysisStage::Completed { report } => report,
        other => panic!("unexpected analysis stage: {:?}", other),
    };
    assert_eq!(report.risk_score, 65);
    assert_eq!(report.provider, "analysis-service");
    assert!(!run.is_partial());
    assert!(engine.slo().latest("analysis_latency_ms").is_some());
}

#[tokio::test]
async fn test_failing_provider_degrades_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = config(ExecutionMode::Parallel, 1_000, 5_000);
    config.analysis = AnalysisConfig {
        enabled: true,
        endpoint: server.uri(),
        timeout_ms: 2_000,
    };
    let engine = engine_with(
        config,
        vec![probe(
            "firewall",
            Behavior::Report(vec![Finding::new("fw.disabled", Severity::Critical, "Disabled")]),
        )],
    );

    let run = engine.run_audit(AuditRequest::with_analysis()).await.unwrap();
    assert!(run.is_partial());
    match run.analysis() {
        AnalysisStage::Degraded { reason, fallback } => {
            assert!(reason.contains("500"), "reason: {}", reason);
            assert_eq!(fallback.risk_score, run.risk_score());
            assert_eq!(
                fallback.executive_summary,
                "Audit identified 1 findings requiring attention. 1 critical issues detected."
            );
        }
        other => panic!("unexpected analysis stage: {:?}", other),
    }
    assert_eq!(engine.circuit_breaker().snapshot().total_failures, 1);
}

#[tokio::test]
async fn test_engine_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(
        br#"
scheduler:
  mode: sequential
  per_probe_timeout_ms: 2000
  elevated: true
circuit_breaker:
  failure_threshold: 2
"#,
    )
    .unwrap();

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.scheduler.mode, ExecutionMode::Sequential);

    let mut registry = ProbeRegistry::new();
    registry.register(probe("users", Behavior::Report(vec![]))).unwrap();
    let engine = AuditEngine::from_config(config, registry).unwrap();

    assert_eq!(engine.circuit_breaker().config().failure_threshold, 2);
    let run = engine.run_audit(AuditRequest::default()).await.unwrap();
    assert_eq!(run.probe_result("users").unwrap().status, ProbeStatus::Ok);
}
