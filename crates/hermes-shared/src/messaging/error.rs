//! # Messaging Errors
//!
//! Error surface for the queue service layer. Constructor helpers keep the
//! call sites terse; everything converts into `HermesError::Messaging` at
//! the crate boundary.

use thiserror::Error;

/// Errors from queue service operations
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Queue '{queue}' not found")]
    QueueNotFound { queue: String },

    #[error("Failed to create queue '{queue}': {reason}")]
    QueueCreation { queue: String, reason: String },

    #[error("Failed to delete queue '{queue}': {reason}")]
    QueueDeletion { queue: String, reason: String },

    #[error("Invalid queue name '{name}': {reason}")]
    InvalidQueueName { name: String, reason: String },

    #[error("Failed to send to '{queue}': {reason}")]
    Send { queue: String, reason: String },

    #[error("Failed to receive from '{queue}': {reason}")]
    Receive { queue: String, reason: String },

    #[error("Failed to delete message {receipt} from '{queue}': {reason}")]
    Delete {
        queue: String,
        receipt: String,
        reason: String,
    },

    #[error("Invalid receipt handle: {0}")]
    InvalidReceiptHandle(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Queue stats failed for '{queue}': {reason}")]
    QueueStats { queue: String, reason: String },

    #[error("Health check failed: {0}")]
    HealthCheck(String),

    #[error("Circuit breaker open for component '{component}'")]
    CircuitBreakerOpen { component: String },

    #[error("Internal messaging error: {0}")]
    Internal(String),
}

impl MessagingError {
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection(reason.into())
    }

    pub fn queue_not_found(queue: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue: queue.into(),
        }
    }

    pub fn queue_creation(queue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QueueCreation {
            queue: queue.into(),
            reason: reason.into(),
        }
    }

    pub fn queue_deletion(queue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QueueDeletion {
            queue: queue.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_queue_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQueueName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn send(queue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Send {
            queue: queue.into(),
            reason: reason.into(),
        }
    }

    pub fn receive(queue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Receive {
            queue: queue.into(),
            reason: reason.into(),
        }
    }

    pub fn delete(
        queue: impl Into<String>,
        receipt: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Delete {
            queue: queue.into(),
            receipt: receipt.into(),
            reason: reason.into(),
        }
    }

    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization(reason.into())
    }

    pub fn queue_stats(queue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QueueStats {
            queue: queue.into(),
            reason: reason.into(),
        }
    }

    pub fn health_check(reason: impl Into<String>) -> Self {
        Self::HealthCheck(reason.into())
    }

    pub fn circuit_breaker_open(component: impl Into<String>) -> Self {
        Self::CircuitBreakerOpen {
            component: component.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_helpers() {
        let err = MessagingError::send("webordinary-input-amelia-scott", "timeout");
        assert!(err.to_string().contains("webordinary-input-amelia-scott"));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_circuit_breaker_open_display() {
        let err = MessagingError::circuit_breaker_open("messaging");
        assert!(err.to_string().contains("Circuit breaker open"));
    }
}
