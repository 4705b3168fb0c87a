//! External analysis provider
//!
//! The engine only sees [`AnalysisProvider`]; [`HttpAnalysisClient`] is the
//! HTTP implementation. Calls are always wrapped by the resilience layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::contracts::*;

/// Findings sent to the provider per request
pub const MAX_FINDINGS_PER_REQUEST: usize = 50;

/// Analysis provider errors
#[derive(Error, Debug, Clone)]
pub enum AnalysisError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Payload handed to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub audit_id: String,
    pub hostname: String,
    pub platform: String,
    pub findings: Vec<Finding>,
}

impl AnalysisRequest {
    /// Build a request from merged findings; only the first
    /// [`MAX_FINDINGS_PER_REQUEST`] in report order are sent
    pub fn new(
        audit_id: impl Into<String>,
        hostname: impl Into<String>,
        platform: impl Into<String>,
        findings: &[Finding],
    ) -> Self {
        Self {
            audit_id: audit_id.into(),
            hostname: hostname.into(),
            platform: platform.into(),
            findings: findings.iter().take(MAX_FINDINGS_PER_REQUEST).cloned().collect(),
        }
    }
}

/// Produces an enriched analysis of a run's findings
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport, AnalysisError>;
}

/// Analysis provider reached over HTTP
pub struct HttpAnalysisClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpAnalysisClient {
    /// Create new client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    risk_score: i64,
    #[serde(default)]
    executive_summary: String,
    #[serde(default)]
    critical_issues: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    provider: Option<String>,
}

impl AnalyzeResponse {
    fn into_report(self) -> Result<AnalysisReport, AnalysisError> {
        let risk_score = u8::try_from(self.risk_score)
            .ok()
            .filter(|score| *score <= 100)
            .ok_or_else(|| {
                AnalysisError::InvalidResponse(format!(
                    "risk score {} outside 0-100",
                    self.risk_score
                ))
            })?;
        if self.executive_summary.trim().is_empty() {
            return Err(AnalysisError::InvalidResponse(
                "empty executive summary".to_string(),
            ));
        }

        Ok(AnalysisReport {
            risk_score,
            executive_summary: self.executive_summary,
            critical_issues: self.critical_issues,
            recommendations: self.recommendations,
            provider: self.provider.unwrap_or_else(|| "remote".to_string()),
        })
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport, AnalysisError> {
        let url = format!("{}/api/v1/analyze", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        if response.status().is_success() {
            let body: AnalyzeResponse = response
                .json()
                .await
                .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;
            body.into_report()
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            Err(AnalysisError::Server {
                status: status.as_u16(),
                message: error_text,
            })
        }
    }
}
