//! HTTP handler for the Host Audit Agent

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use host_audit_core::resilience::CircuitBreakerState;
use host_audit_core::slo::{Alert, ExportFormat, ViolationSummary};
use host_audit_core::{AuditEngine, AuditError, AuditRequest, AuditRun};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Application state
pub struct AppState {
    pub engine: Arc<AuditEngine>,
}

impl AppState {
    pub fn new(engine: AuditEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/slo/alerts", get(slo_alerts))
        .route("/api/v1/slo/violations", get(slo_violations))
        .route("/api/v1/slo/export", get(slo_export))
        .route("/api/v1/audit-runs", post(run_audit))
        .route("/api/v1/audit-runs/verify", post(verify_run))
        .route("/api/v1/circuit", get(circuit_state))
        .route("/api/v1/circuit/reset", post(reset_circuit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type HandlerError = (StatusCode, Json<ApiError>);

fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ApiError {
            error: error.to_string(),
            message: message.into(),
            request_id: Some(Uuid::new_v4()),
        }),
    )
}

fn ok<T>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
        request_id: Uuid::new_v4(),
    })
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let engine = &state.engine;
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        hostname: engine.aggregator().host().hostname.clone(),
        probes_registered: engine.registry().len(),
        circuit_state: engine.circuit_state().to_string(),
    })
}

/// Engine registry followed by the SLO snapshot, Prometheus text format
async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, HandlerError> {
    let engine = &state.engine;
    let mut body = engine
        .metrics_text()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "MetricsError", e.to_string()))?;
    let slo = engine
        .slo()
        .export(ExportFormat::Prometheus)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "MetricsError", e.to_string()))?;
    body.push_str(&slo);

    Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body))
}

/// Alerts for the current SLO snapshot
async fn slo_alerts(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<Alert>>> {
    ok(state.engine.slo().evaluate())
}

async fn slo_violations(State(state): State<Arc<AppState>>) -> Json<ApiResponse<ViolationSummary>> {
    ok(state.engine.slo().violation_summary())
}

/// SLO snapshot in the requested format (default: json)
async fn slo_export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let format: ExportFormat = query
        .format
        .as_deref()
        .unwrap_or("json")
        .parse()
        .map_err(|e: host_audit_core::telemetry::TelemetryError| {
            api_error(StatusCode::BAD_REQUEST, "InvalidFormat", e.to_string())
        })?;

    let body = state
        .engine
        .slo()
        .export(format)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "ExportError", e.to_string()))?;

    let content_type = match format {
        ExportFormat::Prometheus => PROMETHEUS_CONTENT_TYPE,
        ExportFormat::Structured | ExportFormat::Json => "application/json",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body))
}

/// Execute every registered probe and return the sealed run
async fn run_audit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AuditRequest>,
) -> Result<Json<ApiResponse<AuditRun>>, HandlerError> {
    let run = state.engine.run_audit(request).await.map_err(|e| {
        tracing::error!(error = %e, "Audit run failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "AuditError", e.to_string())
    })?;

    tracing::info!(
        audit_id = %run.audit_id(),
        risk_score = run.risk_score(),
        partial = run.is_partial(),
        "Audit run served"
    );
    Ok(ok(run))
}

/// Re-check the integrity hash of an exported run
async fn verify_run(
    State(state): State<Arc<AppState>>,
    Json(run): Json<AuditRun>,
) -> Result<Json<ApiResponse<VerifyResponse>>, HandlerError> {
    match state.engine.verify(&run) {
        Ok(()) => Ok(ok(VerifyResponse {
            audit_id: run.audit_id().to_string(),
            valid: true,
            integrity_hash: run.integrity_hash().to_string(),
        })),
        Err(AuditError::IntegrityViolation(violation)) => Err(api_error(
            StatusCode::CONFLICT,
            "IntegrityViolation",
            violation.to_string(),
        )),
        Err(e) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "VerificationError",
            e.to_string(),
        )),
    }
}

async fn circuit_state(State(state): State<Arc<AppState>>) -> Json<ApiResponse<CircuitBreakerState>> {
    ok(state.engine.circuit_breaker().snapshot())
}

/// Operator reset of the analysis circuit
async fn reset_circuit(State(state): State<Arc<AppState>>) -> Json<ApiResponse<CircuitBreakerState>> {
    state.engine.reset_circuit();
    tracing::info!("Circuit breaker reset by operator");
    ok(state.engine.circuit_breaker().snapshot())
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub hostname: String,
    pub probes_registered: usize,
    pub circuit_state: String,
}

/// Export query parameters
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

/// Verification result
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub audit_id: String,
    pub valid: bool,
    pub integrity_hash: String,
}

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub request_id: Uuid,
}

/// API error
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    pub request_id: Option<Uuid>,
}
