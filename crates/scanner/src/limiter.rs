//! Token-bucket admission control shared by every outbound request.

use std::{sync::Mutex, time::Duration};

use metrics::histogram;
use tokio::time::{sleep_until, Instant};

/// Budget of the bucket: one token every `interval`, holding at most `burst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    interval: Duration,
    burst: u32,
}

impl RateLimit {
    /// Provider budget with an API key.
    pub const WITH_KEY_PER_SECOND: u32 = 5;
    /// Provider budget without one.
    pub const ANONYMOUS_INTERVAL: Duration = Duration::from_secs(5);

    pub fn per_second(requests: u32) -> Self {
        Self::every(Duration::from_secs(1) / requests.max(1))
    }

    pub fn every(interval: Duration) -> Self {
        Self { interval, burst: 1 }
    }

    pub fn with_burst(self, burst: u32) -> Self {
        Self {
            interval: self.interval,
            burst: burst.max(1),
        }
    }

    pub fn for_credential(has_api_key: bool) -> Self {
        if has_api_key {
            Self::per_second(Self::WITH_KEY_PER_SECOND)
        } else {
            Self::every(Self::ANONYMOUS_INTERVAL)
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }
}

/// Hands out request slots at the configured rate.
///
/// Implemented as a virtual-scheduling bucket: `next_free` is the time at
/// which the bucket would be full again were no one to take a token. A caller
/// reserves the earliest slot under the lock and sleeps outside it, so
/// waiting callers are served in reservation order.
#[derive(Debug)]
pub struct RateLimiter {
    limit: RateLimit,
    next_free: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            next_free: Mutex::new(Instant::now()),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Waits until a token is available. Never fails.
    pub async fn acquire(&self) {
        let now = Instant::now();
        let slot = self.reserve(now);
        if slot > now {
            histogram!("scanner_rate_limit_wait_seconds").record((slot - now).as_secs_f64());
            sleep_until(slot).await;
        }
    }

    fn reserve(&self, now: Instant) -> Instant {
        let tolerance = self.limit.interval * (self.limit.burst - 1);
        let mut next_free = self.next_free.lock().expect("mutex poisoned");
        let earliest = next_free.checked_sub(tolerance).unwrap_or(now);
        let slot = earliest.max(now);
        *next_free = (*next_free).max(now) + self.limit.interval;
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn credential_selects_budget() {
        assert_eq!(
            RateLimit::for_credential(true).interval(),
            Duration::from_millis(200)
        );
        assert_eq!(
            RateLimit::for_credential(false).interval(),
            Duration::from_secs(5)
        );
        assert_eq!(RateLimit::for_credential(true).burst(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_request_is_immediate_then_spaced() {
        let limiter = RateLimiter::new(RateLimit::per_second(5));
        let start = Instant::now();

        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_never_exceed_budget_per_window() {
        let interval = Duration::from_secs(5);
        let limiter = Arc::new(RateLimiter::new(RateLimit::every(interval)));
        let start = Instant::now();

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let limiter = Arc::clone(&limiter);
            tasks.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut granted = Vec::new();
        for task in tasks {
            granted.push(task.await.unwrap());
        }
        granted.sort();

        for pair in granted.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
        let in_first_window = granted
            .iter()
            .filter(|at| at.duration_since(start) < interval)
            .count();
        assert_eq!(in_first_window, 1);
        assert_eq!(granted[5].duration_since(start), interval * 5);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_allows_back_to_back_tokens() {
        let limiter = RateLimiter::new(RateLimit::every(Duration::from_secs(1)).with_burst(3));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_refills_the_bucket() {
        let limiter = RateLimiter::new(RateLimit::every(Duration::from_secs(1)));
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
