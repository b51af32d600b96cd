//! # Queue Service Layer
//!
//! Provider-agnostic queue operations: the [`QueueService`] trait, its
//! value types, and the concrete providers behind the [`QueueProvider`]
//! enum.

pub mod providers;
pub mod traits;
pub mod types;

pub use providers::{InMemoryQueueService, PgmqQueueService, QueueProvider};
pub use traits::QueueService;
pub use types::{
    managed_tags, MessageId, MessageMetadata, QueueInfo, QueueStats, QueueTags, QueueTriplet,
    QueueUrl, QueuedMessage, ReceiptHandle, RedrivePolicy,
};
