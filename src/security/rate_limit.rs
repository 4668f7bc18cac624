//! Fixed-window request counters held in a bounded cache.
//!
//! A counter's expiry is set when its window opens and never extended, so a
//! key that goes over its limit stays blocked until the window ends. Counters
//! keep climbing while over the limit. The key space is capped; when it is
//! full the least recently used counter is dropped.

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.start + offset
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("rate limit exceeded for {key}")]
pub struct RateLimitExceeded {
    pub key: String,
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub count: u32,
    pub remaining: u32,
    pub resets_in: Duration,
}

#[derive(Debug)]
struct Counter {
    count: u32,
    expires_at: Instant,
}

pub struct RateLimiter {
    window: Duration,
    clock: Arc<dyn Clock>,
    counters: Cache<String, Arc<Mutex<Counter>>>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("keys", &self.counters.entry_count())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(window: Duration, max_keys: usize) -> Self {
        Self::with_clock(window, max_keys, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(window: Duration, max_keys: usize, clock: Arc<dyn Clock>) -> Self {
        // The cache TTL only reclaims memory; window expiry is decided by `clock`.
        let counters = Cache::builder()
            .max_capacity(u64::try_from(max_keys.max(1)).unwrap_or(u64::MAX))
            .eviction_policy(EvictionPolicy::lru())
            .time_to_live(window)
            .build();

        Self {
            window,
            clock,
            counters,
        }
    }

    /// Count one request against `key` and decide whether it may proceed.
    pub fn check(&self, limit: u32, key: &str) -> Result<RateDecision, RateLimitExceeded> {
        let now = self.clock.now();
        let window = self.window;
        let slot = self.counters.get_with_by_ref(key, || {
            Arc::new(Mutex::new(Counter {
                count: 0,
                expires_at: now + window,
            }))
        });

        let mut counter = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if counter.expires_at <= now {
            counter.count = 0;
            counter.expires_at = now + window;
        }

        counter.count = counter.count.saturating_add(1);
        let resets_in = counter.expires_at.saturating_duration_since(now);

        if counter.count > limit {
            return Err(RateLimitExceeded {
                key: key.to_string(),
                retry_after: resets_in,
            });
        }

        Ok(RateDecision {
            count: counter.count,
            remaining: limit - counter.count,
            resets_in,
        })
    }

    /// Number of live counters, after pending evictions have run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.run_pending_tasks();
        usize::try_from(self.counters.entry_count()).unwrap_or(usize::MAX)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    fn limiter(max_keys: usize) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (
            RateLimiter::with_clock(WINDOW, max_keys, clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_sixth_request_is_rejected() {
        let (limiter, _) = limiter(100);
        for expected in 1..=5 {
            let decision = limiter.check(5, "k").unwrap();
            assert_eq!(decision.count, expected);
        }
        let err = limiter.check(5, "k").unwrap_err();
        assert_eq!(err.key, "k");
        assert_eq!(err.retry_after, WINDOW);
    }

    #[test]
    fn test_counter_resets_after_window() {
        let (limiter, clock) = limiter(100);
        for _ in 0..6 {
            let _ = limiter.check(5, "k");
        }
        assert!(limiter.check(5, "k").is_err());

        clock.advance(WINDOW);
        let decision = limiter.check(5, "k").unwrap();
        assert_eq!(decision.count, 1);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn test_window_is_not_extended_by_requests() {
        let (limiter, clock) = limiter(100);
        limiter.check(5, "k").unwrap();
        clock.advance(Duration::from_secs(40));
        let decision = limiter.check(5, "k").unwrap();
        assert_eq!(decision.resets_in, Duration::from_secs(20));

        clock.advance(Duration::from_secs(20));
        assert_eq!(limiter.check(5, "k").unwrap().count, 1);
    }

    #[test]
    fn test_stays_blocked_while_over_limit() {
        let (limiter, clock) = limiter(100);
        for _ in 0..3 {
            limiter.check(3, "k").unwrap();
        }
        for _ in 0..10 {
            assert!(limiter.check(3, "k").is_err());
        }
        clock.advance(Duration::from_secs(30));
        let err = limiter.check(3, "k").unwrap_err();
        assert_eq!(err.retry_after, Duration::from_secs(30));
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _) = limiter(100);
        for _ in 0..5 {
            limiter.check(5, "a").unwrap();
        }
        assert!(limiter.check(5, "a").is_err());
        assert!(limiter.check(5, "b").is_ok());
    }

    #[test]
    fn test_key_space_is_bounded() {
        let (limiter, _) = limiter(16);
        for i in 0..500 {
            let _ = limiter.check(5, &format!("10.0.{}.{}", i / 256, i % 256));
        }
        assert!(limiter.len() <= 16);
        assert!(!limiter.is_empty());
    }

    #[test]
    fn test_expired_window_restarts_in_place() {
        let (limiter, clock) = limiter(100);
        for _ in 0..5 {
            limiter.check(5, "k").unwrap();
        }
        clock.advance(WINDOW + Duration::from_secs(1));

        let decision = limiter.check(5, "k").unwrap();
        assert_eq!(decision.count, 1);
        assert_eq!(decision.resets_in, WINDOW);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let limiter = Arc::new(RateLimiter::new(WINDOW, 10));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        let _ = limiter.check(100, "shared");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(limiter.check(100, "shared").is_err());
    }
}
