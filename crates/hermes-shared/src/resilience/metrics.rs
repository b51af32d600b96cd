//! Circuit breaker observability snapshot.

use super::circuit_breaker::CircuitState;

/// Point-in-time view of a breaker's counters
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

impl CircuitBreakerMetrics {
    /// Failure ratio over everything recorded so far
    pub fn failure_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            0.0
        } else {
            self.failure_count as f64 / total as f64
        }
    }
}
