//! Circuit breaker for an external dependency
//!
//! All state transitions happen under one mutex, so no caller can observe a
//! half-applied transition. The lock is never held across an await.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Transitions kept for observability
const MAX_TRANSITIONS: usize = 100;

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Failures further apart than this do not count as one streak
    pub failure_window_ms: u64,

    /// Time spent open before a trial call is allowed
    pub cooldown_ms: u64,

    /// Cooldown growth after a failed trial (1.0 disables growth)
    pub cooldown_multiplier: f64,

    /// Upper bound for the grown cooldown
    pub max_cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_ms: 60_000,
            cooldown_ms: 60_000,
            cooldown_multiplier: 2.0,
            max_cooldown_ms: 600_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn failure_window(&self) -> Duration {
        Duration::from_millis(self.failure_window_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("circuit breaker failure_threshold must be at least 1".to_string());
        }
        if !self.cooldown_multiplier.is_finite() || self.cooldown_multiplier < 1.0 {
            return Err("circuit breaker cooldown_multiplier must be >= 1.0".to_string());
        }
        if self.max_cooldown_ms < self.cooldown_ms {
            return Err("circuit breaker max_cooldown_ms must be >= cooldown_ms".to_string());
        }
        Ok(())
    }
}

/// Call rejected without invoking the protected operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Circuit open, retry after {}ms", retry_after.as_millis())]
pub struct CircuitOpenError {
    pub retry_after: Duration,
}

/// Result of a call routed through the breaker
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    #[error("Operation failed: {0}")]
    Operation(E),
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
}

/// Snapshot of breaker state for observability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Remaining cooldown while open
    pub cooldown_remaining_ms: Option<u64>,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejected: u64,
    pub total_opens: u64,
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    streak_started: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    cooldown_until: Option<Instant>,
    current_cooldown: Duration,
    trial_in_flight: bool,
    total_calls: u64,
    total_failures: u64,
    total_rejected: u64,
    total_opens: u64,
    transitions: VecDeque<Transition>,
}

impl Inner {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            streak_started: None,
            last_failure_time: None,
            cooldown_until: None,
            current_cooldown: config.cooldown(),
            trial_in_flight: false,
            total_calls: 0,
            total_failures: 0,
            total_rejected: 0,
            total_opens: 0,
            transitions: VecDeque::new(),
        }
    }

    fn transition(&mut self, to: CircuitState) {
        if self.state == to {
            return;
        }
        if self.transitions.len() == MAX_TRANSITIONS {
            self.transitions.pop_front();
        }
        self.transitions.push_back(Transition {
            from: self.state,
            to,
            at: Utc::now(),
        });
        match to {
            CircuitState::Open => {
                self.total_opens += 1;
                tracing::warn!(
                    from = %self.state,
                    failures = self.consecutive_failures,
                    cooldown_ms = self.current_cooldown.as_millis() as u64,
                    "Circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                tracing::info!("Circuit breaker half-open, admitting trial call");
            }
            CircuitState::Closed => {
                tracing::info!(from = %self.state, "Circuit breaker closed");
            }
        }
        self.state = to;
    }

    fn open(&mut self, now: Instant) {
        self.cooldown_until = Some(now + self.current_cooldown);
        self.trial_in_flight = false;
        self.transition(CircuitState::Open);
    }

    fn close(&mut self, config: &CircuitBreakerConfig) {
        self.consecutive_failures = 0;
        self.streak_started = None;
        self.cooldown_until = None;
        self.current_cooldown = config.cooldown();
        self.trial_in_flight = false;
        self.transition(CircuitState::Closed);
    }
}

/// Circuit breaker guarding one external dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let inner = Mutex::new(Inner::new(&config));
        Self { config, inner }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` if the breaker admits it.
    ///
    /// While open the operation is not invoked at all. In half-open state
    /// exactly one caller runs the trial; the others are rejected.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_admit()?;

        match operation().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(e) => {
                permit.fail();
                Err(BreakerError::Operation(e))
            }
        }
    }

    /// Non-blocking admission check.
    ///
    /// The returned permit must be settled with [`BreakerPermit::succeed`] or
    /// [`BreakerPermit::fail`]. Dropping it unsettled records nothing and
    /// frees the half-open trial slot.
    pub fn try_admit(&self) -> Result<BreakerPermit<'_>, CircuitOpenError> {
        let admission = self.admit()?;
        Ok(BreakerPermit {
            breaker: self,
            admission,
            settled: false,
        })
    }

    fn admit(&self) -> Result<Admission, CircuitOpenError> {
        let now = Instant::now();
        let mut inner = self.lock();

        let admission = match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => match inner.cooldown_until {
                Some(until) if now < until => Err(CircuitOpenError {
                    retry_after: until - now,
                }),
                _ => {
                    inner.transition(CircuitState::HalfOpen);
                    inner.trial_in_flight = true;
                    Ok(Admission::Trial)
                }
            },
            CircuitState::HalfOpen if inner.trial_in_flight => Err(CircuitOpenError {
                retry_after: Duration::ZERO,
            }),
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(Admission::Trial)
            }
        };

        if admission.is_err() {
            inner.total_rejected += 1;
        }
        admission
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();
        inner.total_calls += 1;
        match admission {
            Admission::Trial => inner.close(&self.config),
            Admission::Normal => {
                if inner.state == CircuitState::Closed {
                    inner.consecutive_failures = 0;
                    inner.streak_started = None;
                }
            }
        }
    }

    fn on_failure(&self, admission: Admission) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.total_calls += 1;
        inner.total_failures += 1;
        inner.last_failure_time = Some(Utc::now());

        match admission {
            Admission::Trial => {
                inner.current_cooldown = grow_cooldown(inner.current_cooldown, &self.config);
                inner.open(now);
            }
            Admission::Normal => {
                if inner.state != CircuitState::Closed {
                    return;
                }
                let window = self.config.failure_window();
                let in_streak = inner
                    .streak_started
                    .map(|started| now.duration_since(started) <= window)
                    .unwrap_or(false);
                if in_streak {
                    inner.consecutive_failures += 1;
                } else {
                    inner.streak_started = Some(now);
                    inner.consecutive_failures = 1;
                }

                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.current_cooldown = self.config.cooldown();
                    inner.open(now);
                }
            }
        }
    }

    /// A trial that never settled gives its slot back
    fn abandon_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
            tracing::debug!("Circuit breaker trial call abandoned");
        }
    }

    /// Operator action: force the breaker closed and clear the streak
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.close(&self.config);
        tracing::info!("Circuit breaker reset by operator");
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitBreakerState {
        let now = Instant::now();
        let inner = self.lock();
        CircuitBreakerState {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_time: inner.last_failure_time,
            cooldown_remaining_ms: match (inner.state, inner.cooldown_until) {
                (CircuitState::Open, Some(until)) => {
                    Some(until.saturating_duration_since(now).as_millis() as u64)
                }
                _ => None,
            },
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            total_rejected: inner.total_rejected,
            total_opens: inner.total_opens,
            transitions: inner.transitions.iter().cloned().collect(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Next cooldown after a failed trial, capped at `max_cooldown_ms`
fn grow_cooldown(current: Duration, config: &CircuitBreakerConfig) -> Duration {
    let cap = config.max_cooldown_ms as f64;
    let grown = (current.as_millis() as f64 * config.cooldown_multiplier).min(cap);
    Duration::from_millis(grown as u64)
}

/// Admission to one call through the breaker
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl BreakerPermit<'_> {
    pub fn is_trial(&self) -> bool {
        self.admission == Admission::Trial
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.admission);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.admission);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Trial {
            self.breaker.abandon_trial();
        }
    }
}
