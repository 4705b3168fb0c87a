//! SLO monitoring
//!
//! The monitor keeps the latest value per metric, compares each observation
//! against its threshold and hands alerts to registered observers. It has no
//! dependency on the external analysis provider.

mod export;
mod observers;
mod thresholds;

pub use export::{Dimension, ExportFormat, MetricRecord, SnapshotEntry};
pub use observers::{AlertObserver, ChannelObserver, TracingObserver};
pub use thresholds::{default_thresholds, AlertSeverity, Direction, MetricUnit, SloThreshold};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::telemetry::Result;

/// Alerts kept in the violation history
const MAX_HISTORY: usize = 100;

/// Recent alerts included in a violation summary
const SUMMARY_RECENT: usize = 10;

/// SLO monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SloConfig {
    pub thresholds: Vec<SloThreshold>,
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            thresholds: default_thresholds(),
        }
    }
}

/// A metric crossed its warning or critical level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
    pub remediation_hint: String,
    pub timestamp: DateTime<Utc>,
}

/// Latest value of one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

/// Counts over the violation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub recent: Vec<Alert>,
}

#[derive(Debug, Default)]
struct MonitorState {
    latest: BTreeMap<String, Observation>,
    history: VecDeque<Alert>,
}

/// Threshold monitor over engine metrics
pub struct SloMonitor {
    thresholds: BTreeMap<String, SloThreshold>,
    labels: BTreeMap<String, String>,
    state: Mutex<MonitorState>,
    observers: RwLock<Vec<Arc<dyn AlertObserver>>>,
}

impl SloMonitor {
    pub fn new(thresholds: impl IntoIterator<Item = SloThreshold>) -> Self {
        Self {
            thresholds: thresholds
                .into_iter()
                .map(|t| (t.metric_name.clone(), t))
                .collect(),
            labels: BTreeMap::new(),
            state: Mutex::new(MonitorState::default()),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Labels attached to exported metrics (hostname, platform, ...)
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn register_observer(&self, observer: Arc<dyn AlertObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn thresholds(&self) -> impl Iterator<Item = &SloThreshold> {
        self.thresholds.values()
    }

    pub fn threshold(&self, metric: &str) -> Option<&SloThreshold> {
        self.thresholds.get(metric)
    }

    /// Record a value; returns the alert it raised, if any
    pub fn observe(&self, metric: &str, value: f64) -> Option<Alert> {
        let now = Utc::now();
        let alert = self.check(metric, value, now);

        {
            let mut state = self.lock();
            state.latest.insert(
                metric.to_string(),
                Observation {
                    value,
                    observed_at: now,
                },
            );
            if let Some(alert) = &alert {
                if state.history.len() == MAX_HISTORY {
                    state.history.pop_front();
                }
                state.history.push_back(alert.clone());
            }
        }

        if let Some(alert) = &alert {
            let observers = self
                .observers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for observer in observers {
                observer.on_alert(alert);
            }
        }
        alert
    }

    /// Alerts for the current snapshot, most severe first. Does not notify.
    pub fn evaluate(&self) -> Vec<Alert> {
        let latest = self.lock().latest.clone();
        let mut alerts: Vec<Alert> = latest
            .iter()
            .filter_map(|(metric, obs)| self.check(metric, obs.value, obs.observed_at))
            .collect();
        alerts.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.metric.cmp(&b.metric)));
        alerts
    }

    /// Latest observation per metric
    pub fn snapshot(&self) -> BTreeMap<String, Observation> {
        self.lock().latest.clone()
    }

    pub fn latest(&self, metric: &str) -> Option<f64> {
        self.lock().latest.get(metric).map(|o| o.value)
    }

    pub fn violation_history(&self) -> Vec<Alert> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn violation_summary(&self) -> ViolationSummary {
        let state = self.lock();
        let critical = state
            .history
            .iter()
            .filter(|a| a.severity == AlertSeverity::Critical)
            .count();
        let skip = state.history.len().saturating_sub(SUMMARY_RECENT);
        ViolationSummary {
            total: state.history.len(),
            critical,
            warning: state.history.len() - critical,
            recent: state.history.iter().skip(skip).cloned().collect(),
        }
    }

    /// Serialize the current snapshot
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        let snapshot = self.snapshot();
        export::render(format, &snapshot, &self.thresholds, &self.labels)
    }

    /// Structured records for the current snapshot
    pub fn records(&self) -> Vec<MetricRecord> {
        export::structured_records(&self.snapshot(), &self.thresholds, &self.labels)
    }

    fn check(&self, metric: &str, value: f64, at: DateTime<Utc>) -> Option<Alert> {
        let threshold = self.thresholds.get(metric)?;
        let (severity, level) = threshold.classify(value)?;
        let relation = match threshold.direction {
            Direction::Above => "above",
            Direction::Below => "below",
        };
        Some(Alert {
            severity,
            metric: metric.to_string(),
            value,
            threshold: level,
            message: format!(
                "{} is {} ({} {} threshold {})",
                metric, value, relation, severity, level
            ),
            remediation_hint: threshold.remediation_hint.clone(),
            timestamp: at,
        })
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SloMonitor {
    fn default() -> Self {
        Self::new(default_thresholds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> SloMonitor {
        SloMonitor::new(vec![
            SloThreshold::above("latency_ms", 100.0, 200.0)
                .with_unit(MetricUnit::Milliseconds)
                .with_remediation("Scale out"),
            SloThreshold::below("uptime_percent", 99.5, 99.0).with_unit(MetricUnit::Percent),
        ])
        .with_labels(BTreeMap::from([("hostname".to_string(), "web-1".to_string())]))
    }

    #[test]
    fn test_observe_raises_alerts() {
        let monitor = monitor();

        assert!(monitor.observe("latency_ms", 50.0).is_none());

        let warning = monitor.observe("latency_ms", 150.0).unwrap();
        assert_eq!(warning.severity, AlertSeverity::Warning);
        assert_eq!(warning.threshold, 100.0);
        assert_eq!(warning.remediation_hint, "Scale out");

        let critical = monitor.observe("uptime_percent", 98.0).unwrap();
        assert_eq!(critical.severity, AlertSeverity::Critical);
        assert!(critical.message.contains("below critical threshold 99"));
    }

    #[test]
    fn test_unknown_metric_recorded_without_alert() {
        let monitor = monitor();
        assert!(monitor.observe("queue_depth", 1e9).is_none());
        assert_eq!(monitor.latest("queue_depth"), Some(1e9));
    }

    #[test]
    fn test_evaluate_uses_latest_values() {
        let monitor = monitor();
        monitor.observe("latency_ms", 500.0);
        monitor.observe("uptime_percent", 99.2);

        let alerts = monitor.evaluate();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].metric, "latency_ms");
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);

        monitor.observe("latency_ms", 10.0);
        let alerts = monitor.evaluate();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric, "uptime_percent");
    }

    #[tokio::test]
    async fn test_observers_notified() {
        let monitor = monitor();
        let (observer, mut rx) = ChannelObserver::new(8);
        monitor.register_observer(Arc::new(observer));
        monitor.register_observer(Arc::new(TracingObserver));

        monitor.observe("latency_ms", 50.0);
        monitor.observe("latency_ms", 250.0);

        let alert = rx.recv().await.unwrap();
        assert_eq!(alert.value, 250.0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_violation_summary() {
        let monitor = monitor();
        for _ in 0..3 {
            monitor.observe("latency_ms", 150.0);
        }
        for _ in 0..12 {
            monitor.observe("latency_ms", 300.0);
        }

        let summary = monitor.violation_summary();
        assert_eq!(summary.total, 15);
        assert_eq!(summary.critical, 12);
        assert_eq!(summary.warning, 3);
        assert_eq!(summary.recent.len(), 10);
    }

    #[test]
    fn test_history_bounded() {
        let monitor = monitor();
        for _ in 0..(MAX_HISTORY + 20) {
            monitor.observe("latency_ms", 300.0);
        }
        assert_eq!(monitor.violation_history().len(), MAX_HISTORY);
    }

    #[test]
    fn test_export_prometheus() {
        let monitor = monitor();
        monitor.observe("latency_ms", 150.0);

        let text = monitor.export(ExportFormat::Prometheus).unwrap();
        assert!(text.contains("host_audit_slo_latency_ms{hostname=\"web-1\"} 150"));
        let status = text
            .lines()
            .find(|l| l.starts_with("host_audit_slo_objective_status{"))
            .unwrap();
        assert!(status.contains("metric=\"latency_ms\""));
        assert!(status.contains("hostname=\"web-1\""));
        assert!(status.ends_with(" 1"));
    }

    #[test]
    fn test_export_structured() {
        let monitor = monitor();
        monitor.observe("uptime_percent", 99.9);

        let json = monitor.export(ExportFormat::Structured).unwrap();
        let records: Vec<MetricRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metric_name, "uptime_percent");
        assert_eq!(records[0].unit, "Percent");
        assert_eq!(records[0].dimensions[0].value, "web-1");
    }

    #[test]
    fn test_export_json_status() {
        let monitor = monitor();
        monitor.observe("latency_ms", 250.0);
        monitor.observe("other", 1.0);

        let json = monitor.export(ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["latency_ms"]["status"], "critical");
        assert_eq!(value["other"]["status"], "untracked");
    }
}
