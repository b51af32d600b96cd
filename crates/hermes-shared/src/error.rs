//! # Error Types
//!
//! Top-level error enum for the Hermes core. Subsystems with richer error
//! surfaces (messaging, storage) define their own enums and convert into
//! `HermesError` at the boundary.
//!
//! Error kinds follow the routing design: validation errors are permanent
//! (never retried by the core), transient errors tell the ingress layer to
//! re-deliver, correlation outcomes (timeout/interrupt/cancel) are normal
//! results rather than errors, and fatal errors mark invariant violations.

use thiserror::Error;

/// Result alias used across the Hermes crates
pub type HermesResult<T> = Result<T, HermesError>;

/// Top-level error type for the Hermes core
#[derive(Debug, Error)]
pub enum HermesError {
    /// Message failed validation; permanent, never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Queue or store unreachable; the ingress layer should re-deliver
    #[error("Transient infrastructure error: {0}")]
    Transient(String),

    /// Messaging subsystem failure
    #[error("Messaging error: {0}")]
    Messaging(String),

    /// Durable store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration loading or consistency failure
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Routing pipeline failure that is neither validation nor transient
    #[error("Routing error: {0}")]
    Routing(String),

    /// Invariant violation; the affected tenant loop restarts
    #[error("Fatal internal error: {0}")]
    Fatal(String),
}

impl HermesError {
    /// True when the ingress layer is expected to retry the whole route
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// True for permanent validation rejections
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<crate::messaging::MessagingError> for HermesError {
    fn from(err: crate::messaging::MessagingError) -> Self {
        Self::Messaging(err.to_string())
    }
}

impl From<crate::storage::StorageError> for HermesError {
    fn from(err: crate::storage::StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
