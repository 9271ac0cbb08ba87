//! Circuit breaker for distiller calls.
//!
//! Lock-free: state, failure count, and timestamps are atomics, so the
//! ingest hot path never contends on a mutex.
//!
//! States: closed (pass) → open (reject) once the failure threshold is hit
//! inside the sliding window; open → half-open after the reset timeout,
//! admitting a single trial; half-open → closed on success, back to open
//! on failure.

use crate::epoch_ms;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU32, Ordering};
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failures inside the window that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a trial.
    pub reset_timeout: Duration,
    /// Sliding window for counting failures.
    pub failure_window: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            failure_window: Duration::from_secs(60),
        }
    }
}

/// Human-readable breaker state, for health tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls pass through.
    Closed,
    /// Calls are rejected.
    Open,
    /// One trial call is admitted.
    HalfOpen,
}

/// Lock-free circuit breaker.
pub struct CircuitBreaker {
    state: AtomicU8,
    failures: AtomicU32,
    last_failure_at: AtomicI64,
    opened_at: AtomicI64,
    trial_taken: AtomicU8,
    failure_threshold: u32,
    reset_timeout_ms: i64,
    failure_window_ms: i64,
}

impl CircuitBreaker {
    /// Creates a breaker from config.
    #[must_use]
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            failures: AtomicU32::new(0),
            last_failure_at: AtomicI64::new(0),
            opened_at: AtomicI64::new(0),
            trial_taken: AtomicU8::new(0),
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout_ms: i64::try_from(config.reset_timeout.as_millis()).unwrap_or(i64::MAX),
            failure_window_ms: i64::try_from(config.failure_window.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Returns true if a call may proceed right now.
    ///
    /// In the half-open state only the first caller wins the trial slot;
    /// everyone else is rejected until the trial resolves.
    pub fn allow(&self) -> bool {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => {
                let opened = self.opened_at.load(Ordering::Acquire);
                if epoch_ms() - opened >= self.reset_timeout_ms {
                    // Move to half-open; the CAS loser falls through to the
                    // trial-slot race below.
                    self.state
                        .compare_exchange(
                            STATE_OPEN,
                            STATE_HALF_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .ok();
                    self.trial_taken.store(0, Ordering::Release);
                    self.try_take_trial()
                } else {
                    false
                }
            },
            STATE_HALF_OPEN => self.try_take_trial(),
            _ => true,
        }
    }

    fn try_take_trial(&self) -> bool {
        self.trial_taken
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Records a successful call.
    pub fn on_success(&self) {
        self.failures.store(0, Ordering::Release);
        self.state.store(STATE_CLOSED, Ordering::Release);
    }

    /// Records a failed call. Returns true if this failure opened the
    /// circuit.
    pub fn on_failure(&self) -> bool {
        let now = epoch_ms();
        match self.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => {
                self.open(now);
                true
            },
            STATE_OPEN => false,
            _ => {
                // Failures older than the window no longer count.
                let last = self.last_failure_at.swap(now, Ordering::AcqRel);
                if now - last > self.failure_window_ms {
                    self.failures.store(0, Ordering::Release);
                }
                let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.failure_threshold {
                    self.open(now);
                    true
                } else {
                    false
                }
            },
        }
    }

    fn open(&self, now: i64) {
        self.opened_at.store(now, Ordering::Release);
        self.state.store(STATE_OPEN, Ordering::Release);
        self.failures.store(0, Ordering::Release);
    }

    /// Current state, for health reporting.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => BreakerState::Open,
            STATE_HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(&BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_breaker(threshold: u32, reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(&BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: reset,
            failure_window: Duration::from_secs(60),
        })
    }

    #[test]
    fn test_opens_at_threshold() {
        let breaker = fast_breaker(3, Duration::from_secs(60));
        assert!(breaker.allow());
        assert!(!breaker.on_failure());
        assert!(!breaker.on_failure());
        assert!(breaker.on_failure());
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_half_open_admits_single_trial() {
        let breaker = fast_breaker(1, Duration::from_millis(0));
        breaker.on_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        // Reset timeout of zero: the next allow moves to half-open and
        // takes the one trial slot.
        assert!(breaker.allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(!breaker.allow());

        breaker.on_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = fast_breaker(1, Duration::from_millis(0));
        breaker.on_failure();
        assert!(breaker.allow());
        assert!(breaker.on_failure());
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = fast_breaker(3, Duration::from_secs(60));
        breaker.on_failure();
        breaker.on_failure();
        breaker.on_success();
        breaker.on_failure();
        breaker.on_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
