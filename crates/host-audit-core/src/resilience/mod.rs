//! Resilience layer for external calls
//!
//! [`RateLimiter`] and [`CircuitBreaker`] are plain state objects owned by
//! the engine and shared through `Arc`; [`ResilientCaller`] composes them
//! with a [`BackoffPolicy`] for one dependency.

mod backoff;
mod circuit_breaker;
mod rate_limiter;

pub use backoff::*;
pub use circuit_breaker::*;
pub use rate_limiter::*;

use std::future::Future;
use std::sync::Arc;
use tokio::time::sleep;

/// Why a resilient call did not produce a value
#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E> {
    #[error(transparent)]
    RateLimited(RateLimitExceeded),

    #[error(transparent)]
    CircuitOpen(CircuitOpenError),

    #[error("Operation failed: {0}")]
    Operation(E),
}

/// Rate limiter + circuit breaker + backoff around one external dependency
#[derive(Debug, Clone)]
pub struct ResilientCaller {
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    backoff: BackoffPolicy,
}

impl ResilientCaller {
    pub fn new(limiter: Arc<RateLimiter>, breaker: Arc<CircuitBreaker>, backoff: BackoffPolicy) -> Self {
        Self {
            limiter,
            breaker,
            backoff,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run `operation` once admitted.
    ///
    /// The breaker is consulted before the limiter, so an open circuit fails
    /// immediately and uses no rate-limit quota. Rate-limit rejections are
    /// retried up to `max_retries` times with exponential backoff. Operation
    /// errors are returned as-is; the breaker has already counted them.
    pub async fn call<F, Fut, T, E>(&self, mut operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;

        loop {
            let admitted = self
                .breaker
                .try_admit()
                .map_err(ResilienceError::CircuitOpen)?;

            match self.limiter.acquire().await {
                Ok(permit) => {
                    let result = operation().await;
                    self.limiter.release(permit);
                    return match result {
                        Ok(value) => {
                            admitted.succeed();
                            Ok(value)
                        }
                        Err(err) => {
                            admitted.fail();
                            Err(ResilienceError::Operation(err))
                        }
                    };
                }
                Err(exceeded) => {
                    // unsettled: nothing recorded, trial slot freed
                    drop(admitted);
                    if attempt >= self.backoff.max_retries {
                        return Err(ResilienceError::RateLimited(exceeded));
                    }
                    let delay = self.backoff.delay_for(attempt);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        limit = %exceeded.limit,
                        "Backing off after rate limit rejection"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn caller(per_minute: u32, threshold: u32, retries: u32) -> ResilientCaller {
        ResilientCaller::new(
            Arc::new(RateLimiter::new(RateLimitConfig {
                max_requests_per_minute: per_minute,
                ..Default::default()
            })),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: threshold,
                ..Default::default()
            })),
            BackoffPolicy::new(Duration::from_secs(1), 2.0, Duration::from_secs(60))
                .with_max_retries(retries),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_value_through() {
        let caller = caller(10, 3, 0);
        let value = caller.call(|| async { Ok::<_, String>(42) }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(caller.limiter().stats().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_after_retries() {
        let caller = caller(1, 3, 2);
        caller.call(|| async { Ok::<_, String>(()) }).await.unwrap();

        let invoked = AtomicU32::new(0);
        let result = caller
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::RateLimited(_))));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(caller.limiter().stats().total_rejected, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_outlasts_window() {
        let caller = ResilientCaller::new(
            Arc::new(RateLimiter::new(RateLimitConfig {
                max_requests_per_minute: 1,
                ..Default::default()
            })),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            BackoffPolicy::new(Duration::from_secs(40), 2.0, Duration::from_secs(120))
                .with_jitter(0.0)
                .with_max_retries(2),
        );

        caller.call(|| async { Ok::<_, String>(()) }).await.unwrap();
        // 40s then 80s of backoff: second retry lands after the window rolled
        assert!(caller.call(|| async { Ok::<_, String>(()) }).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_fails_fast() {
        let caller = caller(100, 2, 3);
        for _ in 0..2 {
            let result = caller.call(|| async { Err::<(), _>("down".to_string()) }).await;
            assert!(matches!(result, Err(ResilienceError::Operation(_))));
        }

        let result = caller.call(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(result, Err(ResilienceError::CircuitOpen(_))));
        assert_eq!(caller.breaker().state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_uses_no_quota() {
        let caller = ResilientCaller::new(
            Arc::new(RateLimiter::new(RateLimitConfig {
                max_requests_per_minute: 3,
                ..Default::default()
            })),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown_ms: 10_000,
                ..Default::default()
            })),
            BackoffPolicy::new(Duration::from_secs(1), 2.0, Duration::from_secs(60)).with_max_retries(0),
        );

        let result = caller.call(|| async { Err::<(), _>("down".to_string()) }).await;
        assert!(matches!(result, Err(ResilienceError::Operation(_))));
        for _ in 0..2 {
            let result = caller.call(|| async { Ok::<_, String>(()) }).await;
            assert!(matches!(result, Err(ResilienceError::CircuitOpen(_))));
        }
        assert_eq!(caller.limiter().stats().requests_last_minute, 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(caller.call(|| async { Ok::<_, String>(()) }).await.is_ok());
        assert_eq!(caller.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_does_not_wait_in_queue() {
        let caller = ResilientCaller::new(
            Arc::new(RateLimiter::new(RateLimitConfig {
                max_requests_per_minute: 1,
                policy: RateLimitPolicy::Queue { max_wait_ms: 120_000 },
                ..Default::default()
            })),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            })),
            BackoffPolicy::default(),
        );

        let _ = caller.call(|| async { Err::<(), _>("down".to_string()) }).await;

        let started = tokio::time::Instant::now();
        let result = caller.call(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(result, Err(ResilienceError::CircuitOpen(_))));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
