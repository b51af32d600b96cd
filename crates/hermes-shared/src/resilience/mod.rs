//! # Resilience Primitives
//!
//! Circuit breaker protecting queue send/receive paths. Management and
//! acknowledge operations bypass the breaker: failing an ack only causes a
//! redelivery, and health checks must keep working while the circuit is
//! open.

pub mod circuit_breaker;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use metrics::CircuitBreakerMetrics;
