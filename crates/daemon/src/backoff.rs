//! Restart backoff for capture workers
//!
//! The delay before restart `n` (0-indexed) is `retry_interval × 2^n`,
//! clamped to `[retry_interval, max_backoff]`, with `retry_interval` raised to
//! [`MIN_RETRY_DELAY`] so a zero interval never restarts in a tight loop. The
//! consecutive-failure count
//! drives the exponent and is reset once a process stays up longer than the
//! retry interval.

use crate::config::RecordingConfig;
use std::time::Duration;

/// Growth factor between consecutive restart delays
const BACKOFF_FACTOR: f64 = 2.0;

/// Shortest delay between two launches of the same worker
pub const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Restart delay policy derived from the recording config
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first restart, and the lower bound of every delay
    pub first: Duration,
    /// Upper bound of every delay
    pub max: Duration,
    /// Multiplicative growth factor
    pub factor: f64,
}

impl BackoffPolicy {
    pub fn from_recording(cfg: &RecordingConfig) -> Self {
        let first = Duration::from_secs(cfg.retry_interval).max(MIN_RETRY_DELAY);
        Self {
            first,
            // A store edited by hand may violate max >= first; never go below first
            max: Duration::from_secs(cfg.max_backoff).max(first),
            factor: BACKOFF_FACTOR,
        }
    }

    /// Computes the delay for the given attempt number (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let unclamped = self.first.as_secs_f64() * self.factor.powi(exp);

        let delay = if !unclamped.is_finite() || unclamped > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped)
        };
        delay.max(self.first)
    }
}

/// Per-worker retry bookkeeping
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: BackoffPolicy,
    failures: u32,
    current_delay: Duration,
}

impl RetryState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            current_delay: Duration::ZERO,
        }
    }

    /// Count an unexpected exit and return the delay before the next start.
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.policy.next(self.failures);
        self.failures = self.failures.saturating_add(1);
        self.current_delay = delay;
        delay
    }

    /// Delay after a clean exit: the base interval, failures untouched.
    pub fn clean_exit_delay(&mut self) -> Duration {
        self.current_delay = self.policy.first;
        self.current_delay
    }

    /// Forget past failures after a sustained run.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.current_delay = Duration::ZERO;
    }

    /// Whether a run of `ran_for` counts as sustained.
    pub fn is_sustained(&self, ran_for: Duration) -> bool {
        ran_for > self.policy.first
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}
