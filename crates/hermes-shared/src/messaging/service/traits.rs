//! # Queue Service Trait
//!
//! Provider-agnostic queue operations. Implemented by the in-memory and
//! PGMQ providers; consumers dispatch through the [`QueueProvider`] enum
//! rather than trait objects.
//!
//! [`QueueProvider`]: super::providers::QueueProvider

use async_trait::async_trait;
use std::time::Duration;

use super::types::{
    MessageId, QueueInfo, QueueStats, QueueTags, QueueUrl, QueuedMessage, ReceiptHandle,
    RedrivePolicy,
};
use crate::messaging::messages::{MessageAttributes, QueuePayload};
use crate::messaging::MessagingError;

/// Core queue operations every provider implements
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Create a queue, returning its URL. Idempotent: an existing queue of
    /// the same name returns its current URL without modification.
    async fn create_queue(&self, name: &str) -> Result<QueueUrl, MessagingError>;

    /// Delete a queue and everything in it
    async fn delete_queue(&self, url: &QueueUrl) -> Result<(), MessagingError>;

    /// Resolve a queue name to its URL, if the queue exists
    async fn queue_url(&self, name: &str) -> Result<Option<QueueUrl>, MessagingError>;

    /// Enumerate queues whose names start with `prefix`
    async fn list_queues(&self, prefix: &str) -> Result<Vec<QueueInfo>, MessagingError>;

    /// Point the queue's redrive at a dead-letter queue
    async fn set_redrive_policy(
        &self,
        url: &QueueUrl,
        policy: &RedrivePolicy,
    ) -> Result<(), MessagingError>;

    /// Apply tags to a queue (merge semantics)
    async fn tag_queue(&self, url: &QueueUrl, tags: &QueueTags) -> Result<(), MessagingError>;

    /// Send one payload with its attributes
    async fn send_message(
        &self,
        url: &QueueUrl,
        payload: &QueuePayload,
        attributes: &MessageAttributes,
    ) -> Result<MessageId, MessagingError>;

    /// Receive up to `max_messages`, waiting up to `wait` for the first.
    ///
    /// Received messages become invisible to other consumers for the
    /// provider's visibility window; unacknowledged messages reappear and
    /// their receive count increments. Messages whose receive count exceeds
    /// the queue's redrive policy are moved to the DLQ instead of being
    /// returned.
    async fn receive_messages(
        &self,
        url: &QueueUrl,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueuedMessage>, MessagingError>;

    /// Delete (acknowledge) a received message
    async fn delete_message(
        &self,
        url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), MessagingError>;

    /// Current stats for a queue
    async fn queue_stats(&self, url: &QueueUrl) -> Result<QueueStats, MessagingError>;

    /// Provider reachability
    async fn health_check(&self) -> Result<bool, MessagingError>;

    /// Provider name for logging and metrics
    fn provider_name(&self) -> &'static str;
}
