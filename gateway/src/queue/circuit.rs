//! Circuit breaker for the publish path.
//!
//! State machine: CLOSED → OPEN → HALF_OPEN → CLOSED. Failures inside a
//! rolling monitoring window open the circuit once the threshold is hit;
//! while open, publishes fail immediately without touching the broker.
//! After the recovery timeout a single half-open trial is allowed: success
//! closes the circuit, failure reopens it and restarts the timeout.

use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failures within the monitoring period before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a trial
    pub recovery_timeout: Duration,
    /// Rolling window over which failures are counted
    pub monitoring_period: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Single circuit breaker guarding the broker connection.
///
/// Not internally synchronized; the publisher wraps it in a mutex.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failures: u32,
    window_started: Instant,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failures: 0,
            window_started: Instant::now(),
            opened_at: None,
            trial_in_flight: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether an attempt may proceed right now.
    ///
    /// Transitions OPEN → HALF_OPEN once the recovery timeout has elapsed;
    /// in HALF_OPEN exactly one trial is allowed until its outcome is
    /// recorded.
    pub fn allow(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.recovery_timeout {
                    info!(state = %CircuitState::HalfOpen, "circuit_breaker_trial_allowed");
                    self.state = CircuitState::HalfOpen;
                    self.trial_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    false
                } else {
                    self.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful attempt: closes the circuit and resets counters.
    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            info!(state = %CircuitState::Closed, "circuit_breaker_closed");
        }
        self.state = CircuitState::Closed;
        self.failures = 0;
        self.window_started = Instant::now();
        self.opened_at = None;
        self.trial_in_flight = false;
    }

    /// Record a failed attempt.
    ///
    /// In HALF_OPEN the circuit reopens and the recovery timeout restarts.
    /// In CLOSED the failure counts against the rolling window; hitting the
    /// threshold opens the circuit.
    pub fn record_failure(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                warn!(state = %CircuitState::Open, "circuit_breaker_reopened");
                self.open();
            }
            CircuitState::Closed => {
                if self.window_started.elapsed() > self.config.monitoring_period {
                    self.failures = 0;
                    self.window_started = Instant::now();
                }
                self.failures += 1;
                if self.failures >= self.config.failure_threshold {
                    warn!(
                        failures = self.failures,
                        threshold = self.config.failure_threshold,
                        "circuit_breaker_opened"
                    );
                    self.open();
                }
            }
            // Failures reported while already open carry no new information
            CircuitState::Open => {}
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.trial_in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(20),
            monitoring_period: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_starts_closed_and_allows() {
        let mut breaker = CircuitBreaker::new(test_config());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow());
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let mut breaker = CircuitBreaker::new(test_config());
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.allow());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut breaker = CircuitBreaker::new(test_config());
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_window_expiry_resets_failure_count() {
        let mut breaker = CircuitBreaker::new(test_config());
        breaker.record_failure();
        breaker.record_failure();

        sleep(Duration::from_millis(60));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_exactly_one_trial_after_recovery_timeout() {
        let mut breaker = CircuitBreaker::new(test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(!breaker.allow());

        sleep(Duration::from_millis(25));

        assert!(breaker.allow(), "first attempt after timeout is the trial");
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.allow(), "only one trial until its outcome is known");
        assert!(!breaker.allow());
    }

    #[test]
    fn test_trial_success_closes_circuit() {
        let mut breaker = CircuitBreaker::new(test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        sleep(Duration::from_millis(25));
        assert!(breaker.allow());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow());
    }

    #[test]
    fn test_trial_failure_reopens_and_restarts_timeout() {
        let mut breaker = CircuitBreaker::new(test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        sleep(Duration::from_millis(25));
        assert!(breaker.allow());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow(), "timeout restarted, no immediate trial");

        sleep(Duration::from_millis(25));
        assert!(breaker.allow(), "trial allowed again after second timeout");
    }
}
