//! Alert delivery
//!
//! Observers are called synchronously from `SloMonitor::observe`, so they
//! must not block. Anything slow belongs behind a [`ChannelObserver`].

use tokio::sync::mpsc;

use super::{Alert, AlertSeverity};

/// Receives every alert raised by the monitor
pub trait AlertObserver: Send + Sync {
    fn on_alert(&self, alert: &Alert);
}

/// Writes alerts to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AlertObserver for TracingObserver {
    fn on_alert(&self, alert: &Alert) {
        match alert.severity {
            AlertSeverity::Critical => tracing::error!(
                metric = %alert.metric,
                value = alert.value,
                threshold = alert.threshold,
                remediation = %alert.remediation_hint,
                "{}",
                alert.message
            ),
            AlertSeverity::Warning => tracing::warn!(
                metric = %alert.metric,
                value = alert.value,
                threshold = alert.threshold,
                "{}",
                alert.message
            ),
        }
    }
}

/// Queues alerts for an async consumer (webhook sender, pager bridge).
///
/// Delivery is non-blocking; alerts are dropped when the queue is full.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::Sender<Alert>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl AlertObserver for ChannelObserver {
    fn on_alert(&self, alert: &Alert) {
        if let Err(e) = self.sender.try_send(alert.clone()) {
            tracing::warn!(metric = %alert.metric, error = %e, "Dropped alert, observer queue unavailable");
        }
    }
}
