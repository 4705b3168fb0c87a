//! Rolling-window rate limiter for calls to external dependencies
//!
//! Two independent rolling windows (minute, hour) plus a semaphore bounding
//! in-flight calls. Window bookkeeping is serialized behind one mutex; the
//! semaphore handles concurrency and wakes queued callers on release.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, timeout_at, Instant};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Retry hint used when the concurrency cap is the binding limit
const CONCURRENCY_RETRY_HINT: Duration = Duration::from_millis(50);

/// What to do when a ceiling is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RateLimitPolicy {
    /// Reject immediately with `RateLimitExceeded`
    FailFast,
    /// Wait for a slot, up to `max_wait_ms`
    Queue { max_wait_ms: u64 },
}

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests_per_minute: u32,
    pub max_requests_per_hour: u32,
    pub max_concurrent_requests: u32,
    pub policy: RateLimitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
            max_requests_per_hour: 1000,
            max_concurrent_requests: 5,
            policy: RateLimitPolicy::FailFast,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests_per_minute == 0
            || self.max_requests_per_hour == 0
            || self.max_concurrent_requests == 0
        {
            return Err("rate limit ceilings must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Which ceiling rejected a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Minute,
    Hour,
    Concurrency,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::Minute => "minute",
            LimitKind::Hour => "hour",
            LimitKind::Concurrency => "concurrency",
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call was rejected by the rate limiter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Rate limit exceeded ({limit} ceiling)")]
pub struct RateLimitExceeded {
    pub limit: LimitKind,
    /// Earliest time a retry could be admitted, when known
    pub retry_after: Option<Duration>,
}

/// Admission to make one external call. Dropping it frees the concurrency slot.
#[derive(Debug)]
pub struct RateLimitPermit {
    _slot: OwnedSemaphorePermit,
    acquired_at: Instant,
}

impl RateLimitPermit {
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

/// Point-in-time limiter statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterStats {
    pub requests_last_minute: usize,
    pub requests_last_hour: usize,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub total_granted: u64,
    pub total_rejected: u64,
}

/// Rolling counters of admitted calls
#[derive(Debug, Default)]
struct RateLimitWindow {
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
    total_granted: u64,
    total_rejected: u64,
}

impl RateLimitWindow {
    fn prune(&mut self, now: Instant) {
        Self::prune_older_than(&mut self.minute, now, MINUTE);
        Self::prune_older_than(&mut self.hour, now, HOUR);
    }

    fn prune_older_than(queue: &mut VecDeque<Instant>, now: Instant, span: Duration) {
        while let Some(&oldest) = queue.front() {
            if now.duration_since(oldest) >= span {
                queue.pop_front();
            } else {
                break;
            }
        }
    }

    fn check(&self, now: Instant, config: &RateLimitConfig) -> Result<(), RateLimitExceeded> {
        if self.minute.len() >= config.max_requests_per_minute as usize {
            return Err(RateLimitExceeded {
                limit: LimitKind::Minute,
                retry_after: self.minute.front().map(|t| (*t + MINUTE) - now),
            });
        }
        if self.hour.len() >= config.max_requests_per_hour as usize {
            return Err(RateLimitExceeded {
                limit: LimitKind::Hour,
                retry_after: self.hour.front().map(|t| (*t + HOUR) - now),
            });
        }
        Ok(())
    }

    fn record(&mut self, now: Instant) {
        self.minute.push_back(now);
        self.hour.push_back(now);
        self.total_granted += 1;
    }
}

/// Rate limiter shared by everything that calls one external dependency
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Mutex<RateLimitWindow>,
    slots: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_requests as usize));
        Self {
            config,
            window: Mutex::new(RateLimitWindow::default()),
            slots,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Acquire admission for one call, honoring the configured policy
    pub async fn acquire(&self) -> Result<RateLimitPermit, RateLimitExceeded> {
        match self.config.policy {
            RateLimitPolicy::FailFast => self.try_acquire(),
            RateLimitPolicy::Queue { max_wait_ms } => {
                self.acquire_queued(Duration::from_millis(max_wait_ms)).await
            }
        }
    }

    /// Acquire without waiting, regardless of policy
    pub fn try_acquire(&self) -> Result<RateLimitPermit, RateLimitExceeded> {
        let slot = Arc::clone(&self.slots).try_acquire_owned().map_err(|_| {
            self.reject(RateLimitExceeded {
                limit: LimitKind::Concurrency,
                retry_after: Some(CONCURRENCY_RETRY_HINT),
            })
        })?;
        self.admit(slot).map_err(|e| self.reject(e))
    }

    async fn acquire_queued(&self, max_wait: Duration) -> Result<RateLimitPermit, RateLimitExceeded> {
        let deadline = Instant::now() + max_wait;

        loop {
            let slot = match timeout_at(deadline, Arc::clone(&self.slots).acquire_owned()).await {
                Ok(Ok(slot)) => slot,
                Ok(Err(_)) | Err(_) => {
                    return Err(self.reject(RateLimitExceeded {
                        limit: LimitKind::Concurrency,
                        retry_after: Some(CONCURRENCY_RETRY_HINT),
                    }))
                }
            };

            match self.admit(slot) {
                Ok(permit) => return Ok(permit),
                Err(exceeded) => {
                    let wait = exceeded.retry_after.unwrap_or(CONCURRENCY_RETRY_HINT);
                    if Instant::now() + wait > deadline {
                        return Err(self.reject(exceeded));
                    }
                    tracing::debug!(
                        limit = %exceeded.limit,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limit window full, waiting for it to roll"
                    );
                    sleep(wait).await;
                }
            }
        }
    }

    fn admit(&self, slot: OwnedSemaphorePermit) -> Result<RateLimitPermit, RateLimitExceeded> {
        let now = Instant::now();
        let mut window = self.lock();
        window.prune(now);
        window.check(now, &self.config)?;
        window.record(now);
        Ok(RateLimitPermit {
            _slot: slot,
            acquired_at: now,
        })
    }

    fn reject(&self, exceeded: RateLimitExceeded) -> RateLimitExceeded {
        self.lock().total_rejected += 1;
        tracing::warn!(
            limit = %exceeded.limit,
            retry_after_ms = exceeded.retry_after.map(|d| d.as_millis() as u64),
            "Rate limit exceeded"
        );
        exceeded
    }

    /// Return a permit once the external call has finished
    pub fn release(&self, permit: RateLimitPermit) {
        tracing::debug!(
            held_ms = permit.held_for().as_millis() as u64,
            "Released rate limit permit"
        );
        drop(permit);
    }

    pub fn stats(&self) -> RateLimiterStats {
        let now = Instant::now();
        let mut window = self.lock();
        window.prune(now);
        let max_concurrent = self.config.max_concurrent_requests as usize;
        RateLimiterStats {
            requests_last_minute: window.minute.len(),
            requests_last_hour: window.hour.len(),
            in_flight: max_concurrent.saturating_sub(self.slots.available_permits()),
            max_concurrent,
            total_granted: window.total_granted,
            total_rejected: window.total_rejected,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RateLimitWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
