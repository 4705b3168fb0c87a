//! Exponential backoff with jitter
//!
//! [`compute_delay`] is pure: the jitter sample is an argument, so delays
//! are reproducible in tests. [`BackoffPolicy::delay_for`] draws the sample.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base_delay_ms: u64,

    /// Growth factor per attempt
    pub multiplier: f64,

    /// Upper bound on any single delay
    pub max_delay_ms: u64,

    /// Fraction of the delay that may be shaved off at random (0.0 - 1.0)
    pub jitter_ratio: f64,

    /// Retries after the first rejected attempt
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            multiplier: 1.5,
            max_delay_ms: 30_000,
            jitter_ratio: 0.25,
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            base_delay_ms: base.as_millis() as u64,
            multiplier,
            max_delay_ms: max.as_millis() as u64,
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Delay before retry `attempt` (0-based), with a random jitter sample
    pub fn delay_for(&self, attempt: u32) -> Duration {
        compute_delay(self, attempt, rand::random::<f64>())
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("backoff multiplier must be a finite number >= 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err("backoff jitter_ratio must be within 0.0..=1.0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("backoff max_delay_ms must be >= base_delay_ms".to_string());
        }
        Ok(())
    }
}

/// Map an attempt number to a delay.
///
/// `base * multiplier^attempt`, capped at `max`, then reduced by up to
/// `jitter_ratio` of itself according to `jitter_sample` (clamped to
/// `0.0..=1.0`). The result never exceeds the cap.
pub fn compute_delay(policy: &BackoffPolicy, attempt: u32, jitter_sample: f64) -> Duration {
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let raw = policy.base_delay_ms as f64 * policy.multiplier.powi(exponent);
    let capped = if raw.is_finite() {
        raw.min(policy.max_delay_ms as f64)
    } else {
        policy.max_delay_ms as f64
    };

    let sample = if jitter_sample.is_nan() {
        0.0
    } else {
        jitter_sample.clamp(0.0, 1.0)
    };
    let jitter = capped * policy.jitter_ratio.clamp(0.0, 1.0) * sample;

    Duration::from_millis((capped - jitter).max(0.0).round() as u64)
}
