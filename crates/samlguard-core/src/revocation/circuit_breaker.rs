//! Circuit breaker isolating failing CRL sources.
//!
//! Transitions: Closed -> Open after `failure_threshold` failures inside the
//! rolling window; Open -> HalfOpen once the cooldown elapses; a successful
//! probe closes the circuit, a failed probe re-opens it with a fresh
//! cooldown.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::BreakerConfig;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    /// Checks run normally.
    Closed,
    /// Checks are skipped; the last known valid-certificate set stays in use.
    Open,
    /// Cooldown elapsed; one probe check is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Per-source circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    failure_count: u32,
    window_start: Option<Instant>,
    last_transition: Instant,
    failure_threshold: u32,
    failure_window: Duration,
    open_duration: Duration,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            window_start: None,
            last_transition: Instant::now(),
            failure_threshold: config.failure_threshold,
            failure_window: Duration::from_secs(config.window_secs),
            open_duration: Duration::from_secs(config.open_secs),
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        self.state
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Whether a check may run now. Moves Open -> HalfOpen once the cooldown
    /// has elapsed, allowing a single probe.
    pub fn should_allow_check(&mut self) -> bool {
        match self.state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => {
                if self.last_transition.elapsed() >= self.open_duration {
                    self.transition_to(CircuitBreakerState::HalfOpen);
                    true
                } else {
                    debug!(state = %self.state, "CRL check suppressed by circuit breaker");
                    false
                }
            }
        }
    }

    pub fn record_failure(&mut self) {
        match self.state {
            CircuitBreakerState::Closed => {
                let now = Instant::now();
                match self.window_start {
                    Some(start) if now.duration_since(start) <= self.failure_window => {
                        self.failure_count += 1;
                    }
                    _ => {
                        self.window_start = Some(now);
                        self.failure_count = 1;
                    }
                }
                if self.failure_count >= self.failure_threshold {
                    self.transition_to(CircuitBreakerState::Open);
                    warn!(
                        failures = self.failure_count,
                        "Circuit breaker opened for CRL source"
                    );
                }
            }
            CircuitBreakerState::HalfOpen => {
                self.transition_to(CircuitBreakerState::Open);
                warn!("CRL probe failed, circuit re-opened");
            }
            CircuitBreakerState::Open => {}
        }
    }

    pub fn record_success(&mut self) {
        match self.state {
            CircuitBreakerState::Closed => {
                self.failure_count = 0;
                self.window_start = None;
            }
            CircuitBreakerState::HalfOpen => {
                self.transition_to(CircuitBreakerState::Closed);
                debug!("CRL probe succeeded, circuit closed");
            }
            CircuitBreakerState::Open => {}
        }
    }

    fn transition_to(&mut self, new_state: CircuitBreakerState) {
        debug!(from = %self.state, to = %new_state, "Circuit breaker transition");
        self.state = new_state;
        self.last_transition = Instant::now();
        if new_state == CircuitBreakerState::Closed {
            self.failure_count = 0;
            self.window_start = None;
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate_transition(&mut self, by: Duration) {
        self.last_transition = Instant::now() - by;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, open_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(&BreakerConfig {
            failure_threshold: threshold,
            window_secs: 60,
            open_secs,
        })
    }

    #[test]
    fn starts_closed_and_allows_checks() {
        let mut cb = breaker(3, 30);
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
        assert!(cb.should_allow_check());
    }

    #[test]
    fn opens_at_threshold_and_suppresses_checks() {
        let mut cb = breaker(3, 30);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Open);
        assert!(!cb.should_allow_check());
    }

    #[test]
    fn cooldown_allows_probe_and_success_closes() {
        let mut cb = breaker(1, 30);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Open);

        cb.backdate_transition(Duration::from_secs(31));
        assert!(cb.should_allow_check());
        assert_eq!(cb.state(), CircuitBreakerState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
    }

    #[test]
    fn failed_probe_reopens_with_fresh_cooldown() {
        let mut cb = breaker(1, 30);
        cb.record_failure();
        cb.backdate_transition(Duration::from_secs(31));
        assert!(cb.should_allow_check());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Open);
        assert!(!cb.should_allow_check());
    }

    #[test]
    fn stale_window_restarts_count() {
        let mut cb = CircuitBreaker::new(&BreakerConfig {
            failure_threshold: 3,
            window_secs: 0,
            open_secs: 30,
        });
        // Zero-length window: each failure starts a fresh count.
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
    }

    #[test]
    fn success_resets_failure_count() {
        let mut cb = breaker(5, 30);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.failure_count(), 2);
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
    }
}
