//! Circuit breaker state machine for the tool gateway (spec §4.14):
//! `CLOSED -> OPEN -> HALF_OPEN -> CLOSED`. Grounded on the provider
//! registry's own resilience idiom (`ragflow-llm::registry`'s cached
//! failure + back-off window), generalized into an explicit three-state
//! machine since spec §4.14 names states rather than just a back-off.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

const FAILURE_THRESHOLD: u32 = 5;
const RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// One breaker per host. `consecutive_failures` and the half-open probe
/// flag are atomics so `allow_request` can be a lock-free fast path in the
/// common (closed, healthy) case.
pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    opened_at: RwLock<Option<Instant>>,
    consecutive_failures: AtomicU32,
    half_open_probe_in_flight: AtomicBool,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            opened_at: RwLock::new(None),
            consecutive_failures: AtomicU32::new(0),
            half_open_probe_in_flight: AtomicBool::new(false),
        }
    }
}

/// What the caller may do right now.
pub enum Admission {
    /// Proceed with the call normally.
    Allowed,
    /// Proceed, but this is the single probe deciding HALF_OPEN's fate;
    /// the caller must call `record_success`/`record_failure` for it.
    Probe,
    /// Circuit is open; fail fast without calling out.
    Rejected,
}

impl CircuitBreaker {
    pub fn state(&self) -> CircuitState {
        *self.state.read()
    }

    pub fn admit(&self) -> Admission {
        let current = *self.state.read();
        match current {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let elapsed = self.opened_at.read().map(|at| at.elapsed()).unwrap_or_default();
                if elapsed < RECOVERY_TIMEOUT {
                    return Admission::Rejected;
                }
                // Recovery window elapsed: transition to half-open and let
                // exactly one caller through as the probe.
                let mut state = self.state.write();
                if *state == CircuitState::Open {
                    *state = CircuitState::HalfOpen;
                }
                drop(state);
                if self
                    .half_open_probe_in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if self
                    .half_open_probe_in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.half_open_probe_in_flight.store(false, Ordering::SeqCst);
        *self.state.write() = CircuitState::Closed;
        *self.opened_at.write() = None;
    }

    pub fn record_failure(&self) {
        self.half_open_probe_in_flight.store(false, Ordering::SeqCst);
        let current = *self.state.read();
        if current == CircuitState::HalfOpen {
            // Probe failed: straight back to open, reset the timer.
            *self.state.write() = CircuitState::Open;
            *self.opened_at.write() = Some(Instant::now());
            return;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= FAILURE_THRESHOLD {
            *self.state.write() = CircuitState::Open;
            *self.opened_at.write() = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_five_consecutive_failures() {
        let breaker = CircuitBreaker::default();
        for _ in 0..4 {
            assert!(matches!(breaker.admit(), Admission::Allowed));
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(matches!(breaker.admit(), Admission::Allowed));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn rejects_while_open_before_recovery_timeout() {
        let breaker = CircuitBreaker::default();
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(breaker.admit(), Admission::Rejected));
    }

    #[test]
    fn success_resets_failure_count_and_closes() {
        let breaker = CircuitBreaker::default();
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        for _ in 0..4 {
            breaker.record_failure();
        }
        // Only 4 consecutive failures after the reset: still closed.
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn only_one_probe_admitted_in_half_open() {
        let breaker = CircuitBreaker::default();
        for _ in 0..5 {
            breaker.record_failure();
        }
        *breaker.opened_at.write() = Some(Instant::now() - RECOVERY_TIMEOUT - Duration::from_secs(1));
        assert!(matches!(breaker.admit(), Admission::Probe));
        // A second caller arriving while the probe is in flight is rejected.
        assert!(matches!(breaker.admit(), Admission::Rejected));
    }

    #[test]
    fn failed_probe_reopens_the_circuit() {
        let breaker = CircuitBreaker::default();
        for _ in 0..5 {
            breaker.record_failure();
        }
        *breaker.opened_at.write() = Some(Instant::now() - RECOVERY_TIMEOUT - Duration::from_secs(1));
        assert!(matches!(breaker.admit(), Admission::Probe));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
