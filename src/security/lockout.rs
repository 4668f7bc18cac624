//! Hook for reacting to repeated failed logins.
//!
//! The authenticator consults a [`LoginAttemptPolicy`] before verifying a
//! password and reports every outcome back to it. [`NoLockout`] is the
//! default. [`AttemptLockout`] is an in-memory policy enabled through
//! `security.login_lockout`.

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

use super::rate_limit::{Clock, SystemClock};
use crate::config::LoginLockoutConfig;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("account temporarily locked")]
pub struct LockedOut {
    pub retry_after: Duration,
}

pub trait LoginAttemptPolicy: Send + Sync + fmt::Debug {
    fn check(&self, username: &str) -> Result<(), LockedOut>;

    fn record_failure(&self, username: &str);

    fn record_success(&self, username: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoLockout;

impl LoginAttemptPolicy for NoLockout {
    fn check(&self, _username: &str) -> Result<(), LockedOut> {
        Ok(())
    }

    fn record_failure(&self, _username: &str) {}

    fn record_success(&self, _username: &str) {}
}

#[derive(Debug)]
struct Attempts {
    failures: u32,
    window_started: Instant,
    locked_until: Option<Instant>,
}

pub struct AttemptLockout {
    max_attempts: u32,
    window: Duration,
    lockout: Duration,
    clock: Arc<dyn Clock>,
    attempts: Cache<String, Arc<Mutex<Attempts>>>,
}

impl fmt::Debug for AttemptLockout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptLockout")
            .field("max_attempts", &self.max_attempts)
            .field("window", &self.window)
            .field("lockout", &self.lockout)
            .finish_non_exhaustive()
    }
}

impl AttemptLockout {
    #[must_use]
    pub fn new(config: &LoginLockoutConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(config: &LoginLockoutConfig, clock: Arc<dyn Clock>) -> Self {
        let window = Duration::from_secs(config.window_seconds);
        let lockout = Duration::from_secs(config.lockout_seconds);

        // Idle entries are stale once neither a window nor a lock can be open.
        let attempts = Cache::builder()
            .max_capacity(config.max_tracked.max(1))
            .eviction_policy(EvictionPolicy::lru())
            .time_to_idle(window.max(lockout))
            .build();

        Self {
            max_attempts: config.max_attempts.max(1),
            window,
            lockout,
            clock,
            attempts,
        }
    }

    fn key(username: &str) -> String {
        username.trim().to_lowercase()
    }

    #[must_use]
    pub fn tracked(&self) -> u64 {
        self.attempts.run_pending_tasks();
        self.attempts.entry_count()
    }
}

impl LoginAttemptPolicy for AttemptLockout {
    fn check(&self, username: &str) -> Result<(), LockedOut> {
        let now = self.clock.now();
        let Some(slot) = self.attempts.get(&Self::key(username)) else {
            return Ok(());
        };

        let locked_until = slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .locked_until;
        match locked_until {
            Some(until) if until > now => Err(LockedOut {
                retry_after: until - now,
            }),
            _ => Ok(()),
        }
    }

    fn record_failure(&self, username: &str) {
        let now = self.clock.now();
        let slot = self.attempts.get_with(Self::key(username), || {
            Arc::new(Mutex::new(Attempts {
                failures: 0,
                window_started: now,
                locked_until: None,
            }))
        });
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if now - entry.window_started >= self.window {
            entry.failures = 0;
            entry.window_started = now;
        }

        entry.failures += 1;
        if entry.failures >= self.max_attempts {
            tracing::warn!(username = %username, "Locking account after repeated failed logins");
            entry.locked_until = Some(now + self.lockout);
            entry.failures = 0;
            entry.window_started = now;
        }
    }

    fn record_success(&self, username: &str) {
        self.attempts.invalidate(&Self::key(username));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::rate_limit::ManualClock;

    fn lockout() -> (AttemptLockout, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let config = LoginLockoutConfig {
            enabled: true,
            max_attempts: 3,
            window_seconds: 60,
            lockout_seconds: 120,
            max_tracked: 8,
        };
        (AttemptLockout::with_clock(&config, clock.clone()), clock)
    }

    #[test]
    fn test_no_lockout_never_blocks() {
        let policy = NoLockout;
        for _ in 0..100 {
            policy.record_failure("admin");
        }
        assert!(policy.check("admin").is_ok());
    }

    #[test]
    fn test_locks_after_max_attempts() {
        let (policy, clock) = lockout();
        policy.record_failure("admin");
        policy.record_failure("Admin");
        assert!(policy.check("admin").is_ok());

        policy.record_failure("admin");
        let err = policy.check("ADMIN").unwrap_err();
        assert_eq!(err.retry_after, Duration::from_secs(120));

        clock.advance(Duration::from_secs(120));
        assert!(policy.check("admin").is_ok());
    }

    #[test]
    fn test_failures_outside_window_do_not_accumulate() {
        let (policy, clock) = lockout();
        policy.record_failure("admin");
        policy.record_failure("admin");
        clock.advance(Duration::from_secs(61));
        policy.record_failure("admin");
        assert!(policy.check("admin").is_ok());
    }

    #[test]
    fn test_success_clears_failures() {
        let (policy, _) = lockout();
        policy.record_failure("admin");
        policy.record_failure("admin");
        policy.record_success("admin");
        policy.record_failure("admin");
        assert!(policy.check("admin").is_ok());
    }

    #[test]
    fn test_username_spray_stays_bounded() {
        let (policy, _) = lockout();
        for i in 0..1_000 {
            policy.record_failure(&format!("user{i}"));
        }
        assert!(policy.tracked() <= 8);
    }
}
