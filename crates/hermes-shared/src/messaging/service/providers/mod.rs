//! # Queue Providers
//!
//! Concrete [`QueueService`] implementations plus the enum-dispatch wrapper
//! consumed everywhere else. Enum dispatch keeps the hot paths free of
//! vtables and makes the provider set explicit.

pub mod in_memory;
pub mod pgmq;

pub use in_memory::InMemoryQueueService;
pub use self::pgmq::PgmqQueueService;

use std::time::Duration;

use super::traits::QueueService;
use super::types::{
    MessageId, QueueInfo, QueueStats, QueueTags, QueueUrl, QueuedMessage, ReceiptHandle,
    RedrivePolicy,
};
use crate::messaging::messages::{MessageAttributes, QueuePayload};
use crate::messaging::MessagingError;

/// Enum dispatch over the available queue backends
#[derive(Debug, Clone)]
pub enum QueueProvider {
    InMemory(InMemoryQueueService),
    Pgmq(PgmqQueueService),
}

impl QueueProvider {
    /// Process-local provider for tests and single-process deployments
    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemoryQueueService::new())
    }

    /// Durable PGMQ provider
    pub async fn new_pgmq(database_url: &str) -> Result<Self, MessagingError> {
        Ok(Self::Pgmq(PgmqQueueService::new(database_url).await?))
    }

    pub async fn create_queue(&self, name: &str) -> Result<QueueUrl, MessagingError> {
        match self {
            Self::InMemory(s) => s.create_queue(name).await,
            Self::Pgmq(s) => s.create_queue(name).await,
        }
    }

    pub async fn delete_queue(&self, url: &QueueUrl) -> Result<(), MessagingError> {
        match self {
            Self::InMemory(s) => s.delete_queue(url).await,
            Self::Pgmq(s) => s.delete_queue(url).await,
        }
    }

    pub async fn queue_url(&self, name: &str) -> Result<Option<QueueUrl>, MessagingError> {
        match self {
            Self::InMemory(s) => s.queue_url(name).await,
            Self::Pgmq(s) => s.queue_url(name).await,
        }
    }

    pub async fn list_queues(&self, prefix: &str) -> Result<Vec<QueueInfo>, MessagingError> {
        match self {
            Self::InMemory(s) => s.list_queues(prefix).await,
            Self::Pgmq(s) => s.list_queues(prefix).await,
        }
    }

    pub async fn set_redrive_policy(
        &self,
        url: &QueueUrl,
        policy: &RedrivePolicy,
    ) -> Result<(), MessagingError> {
        match self {
            Self::InMemory(s) => s.set_redrive_policy(url, policy).await,
            Self::Pgmq(s) => s.set_redrive_policy(url, policy).await,
        }
    }

    pub async fn tag_queue(&self, url: &QueueUrl, tags: &QueueTags) -> Result<(), MessagingError> {
        match self {
            Self::InMemory(s) => s.tag_queue(url, tags).await,
            Self::Pgmq(s) => s.tag_queue(url, tags).await,
        }
    }

    pub async fn send_message(
        &self,
        url: &QueueUrl,
        payload: &QueuePayload,
        attributes: &MessageAttributes,
    ) -> Result<MessageId, MessagingError> {
        match self {
            Self::InMemory(s) => s.send_message(url, payload, attributes).await,
            Self::Pgmq(s) => s.send_message(url, payload, attributes).await,
        }
    }

    pub async fn receive_messages(
        &self,
        url: &QueueUrl,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueuedMessage>, MessagingError> {
        match self {
            Self::InMemory(s) => s.receive_messages(url, max_messages, wait).await,
            Self::Pgmq(s) => s.receive_messages(url, max_messages, wait).await,
        }
    }

    pub async fn delete_message(
        &self,
        url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        match self {
            Self::InMemory(s) => s.delete_message(url, receipt).await,
            Self::Pgmq(s) => s.delete_message(url, receipt).await,
        }
    }

    pub async fn queue_stats(&self, url: &QueueUrl) -> Result<QueueStats, MessagingError> {
        match self {
            Self::InMemory(s) => s.queue_stats(url).await,
            Self::Pgmq(s) => s.queue_stats(url).await,
        }
    }

    pub async fn health_check(&self) -> Result<bool, MessagingError> {
        match self {
            Self::InMemory(s) => s.health_check().await,
            Self::Pgmq(s) => s.health_check().await,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::InMemory(s) => s.provider_name(),
            Self::Pgmq(s) => s.provider_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_dispatch() {
        let provider = QueueProvider::new_in_memory();
        assert_eq!(provider.provider_name(), "in_memory");
        let url = provider.create_queue("dispatch-test").await.unwrap();
        assert_eq!(
            provider.queue_url("dispatch-test").await.unwrap(),
            Some(url)
        );
        assert!(provider.health_check().await.unwrap());
    }
}
