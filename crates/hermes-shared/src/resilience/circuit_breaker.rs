//! # Circuit Breaker
//!
//! Three-state breaker (closed, open, half-open) with proper half-open
//! recovery: the circuit only closes again after `success_threshold`
//! consecutive successes, so one lucky call cannot mask an outage.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::metrics::CircuitBreakerMetrics;

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Failing fast; calls rejected until the recovery timeout elapses
    Open,
    /// Probing recovery; limited calls allowed
    HalfOpen,
}

/// Breaker thresholds
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing
    pub timeout: Duration,
    /// Consecutive half-open successes before the circuit closes
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    opened_at: Option<Instant>,
    consecutive_failures: u32,
    consecutive_successes: u32,
    success_count: u64,
    failure_count: u64,
}

/// Mutex-guarded circuit breaker shared across tasks via `Arc`
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                opened_at: None,
                consecutive_failures: 0,
                consecutive_successes: 0,
                success_count: 0,
                failure_count: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gate the next call. Open circuits transition to half-open once the
    /// recovery timeout has elapsed.
    pub fn should_allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if elapsed {
                    info!(component = %self.name, "Circuit breaker probing recovery (half-open)");
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful protected operation
    pub fn record_success(&self, _duration: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.success_count += 1;
        inner.consecutive_failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.consecutive_successes += 1;
            if inner.consecutive_successes >= self.config.success_threshold {
                info!(component = %self.name, "Circuit breaker closed after recovery");
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
            }
        }
    }

    /// Record a failed protected operation
    pub fn record_failure(&self, _duration: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.failure_count += 1;
        inner.consecutive_successes = 0;
        inner.consecutive_failures += 1;

        let should_open = match inner.state {
            // Any half-open failure re-opens immediately
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if should_open {
            warn!(
                component = %self.name,
                consecutive_failures = inner.consecutive_failures,
                "Circuit breaker opened"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .state
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Emergency kill switch
    pub fn force_open(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
    }

    /// Emergency recovery
    pub fn force_closed(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.consecutive_failures = 0;
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        CircuitBreakerMetrics {
            state: inner.state,
            success_count: inner.success_count,
            failure_count: inner.failure_count,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failures: u32, successes: u32, timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test".to_string(),
            CircuitBreakerConfig {
                failure_threshold: failures,
                timeout,
                success_threshold: successes,
            },
        )
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 1, Duration::from_secs(60));
        for _ in 0..2 {
            cb.record_failure(Duration::ZERO);
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        cb.record_failure(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = breaker(3, 1, Duration::from_secs(60));
        cb.record_failure(Duration::ZERO);
        cb.record_failure(Duration::ZERO);
        cb.record_success(Duration::ZERO);
        cb.record_failure(Duration::ZERO);
        cb.record_failure(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_recovery_needs_success_threshold() {
        let cb = breaker(1, 2, Duration::from_millis(0));
        cb.record_failure(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);

        // Timeout elapsed (zero) - next gate probes half-open
        assert!(cb.should_allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(1, 2, Duration::from_millis(0));
        cb.record_failure(Duration::ZERO);
        assert!(cb.should_allow());
        cb.record_failure(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_forced_states() {
        let cb = breaker(5, 2, Duration::from_secs(60));
        cb.force_open();
        assert!(!cb.should_allow());
        cb.force_closed();
        assert!(cb.should_allow());
        assert!(cb.is_healthy());
    }

    #[test]
    fn test_metrics_snapshot() {
        let cb = breaker(5, 2, Duration::from_secs(60));
        cb.record_success(Duration::ZERO);
        cb.record_failure(Duration::ZERO);
        let metrics = cb.metrics();
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 1);
        assert_eq!(metrics.consecutive_failures, 1);
    }
}
