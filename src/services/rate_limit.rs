//! Fixed-interval pacing for calls to external services.
//!
//! [`RateLimiter::acquire`] is awaited before every outbound request. The
//! first call proceeds at once; each later call waits until at least
//! `interval` has passed since the previous one.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    /// A limiter that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Waits for the next request slot and claims it.
    #[instrument(level = "trace", skip(self), fields(interval_ms = self.interval.as_millis()))]
    pub async fn acquire(&self) -> Duration {
        let mut last = self.last_request.lock().await;

        let waited = match *last {
            Some(previous) if !self.interval.is_zero() => {
                let ready_at = previous + self.interval;
                let now = Instant::now();
                if ready_at > now {
                    let delay = ready_at - now;
                    debug!(delay_ms = delay.as_millis(), "Rate limiting next request");
                    tokio::time::sleep(delay).await;
                    delay
                } else {
                    Duration::ZERO
                }
            }
            _ => Duration::ZERO,
        };

        *last = Some(Instant::now());
        waited
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(crate::constants::intervals::DEFAULT_REQUEST_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_waits_for_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_time_counts_toward_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_disabled_never_waits() {
        let limiter = RateLimiter::disabled();
        for _ in 0..5 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
    }
}
