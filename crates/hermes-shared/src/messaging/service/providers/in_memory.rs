//! # In-Memory Queue Service
//!
//! Process-local queue provider with the same semantics the durable
//! providers guarantee: visibility timeouts, receive counts, redrive to a
//! dead-letter queue, tags, and creation timestamps. Used by unit and
//! scenario tests, and usable for single-process deployments.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use super::super::traits::QueueService;
use super::super::types::{
    MessageId, MessageMetadata, QueueInfo, QueueStats, QueueTags, QueueUrl, QueuedMessage,
    ReceiptHandle, RedrivePolicy,
};
use crate::messaging::messages::{MessageAttributes, QueuePayload};
use crate::messaging::MessagingError;

/// How long a received message stays invisible before redelivery
const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait-loop slice so visibility expirations are observed without a notify
const WAIT_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
struct StoredMessage {
    seq: i64,
    body: serde_json::Value,
    attributes: MessageAttributes,
    enqueued_at: DateTime<Utc>,
    visible_at: Instant,
    receive_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<StoredMessage>,
    tags: QueueTags,
    redrive: Option<RedrivePolicy>,
}

#[derive(Debug)]
struct InMemoryQueue {
    url: QueueUrl,
    created_at: DateTime<Utc>,
    state: Mutex<QueueState>,
    arrivals: Notify,
}

/// In-memory implementation of [`QueueService`]
#[derive(Debug, Clone)]
pub struct InMemoryQueueService {
    queues: Arc<DashMap<String, Arc<InMemoryQueue>>>,
    next_seq: Arc<AtomicI64>,
    visibility_timeout: Duration,
}

impl Default for InMemoryQueueService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueueService {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicI64::new(1)),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        }
    }

    /// Shorter visibility window for redelivery-focused tests
    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            ..Self::new()
        }
    }

    fn queue_by_url(&self, url: &QueueUrl) -> Result<Arc<InMemoryQueue>, MessagingError> {
        self.queues
            .get(url.queue_name())
            .map(|q| q.clone())
            .ok_or_else(|| MessagingError::queue_not_found(url.queue_name()))
    }

    /// Move a message that exhausted its receive budget onto the DLQ
    async fn redrive_message(&self, policy: &RedrivePolicy, message: StoredMessage) {
        if let Ok(dlq) = self.queue_by_url(&policy.dead_letter_url) {
            let mut state = dlq.state.lock().await;
            state.messages.push_back(StoredMessage {
                visible_at: Instant::now(),
                receive_count: 0,
                ..message
            });
            dlq.arrivals.notify_waiters();
        } else {
            debug!(
                dlq = %policy.dead_letter_url,
                "Dropping redriven message: dead-letter queue no longer exists"
            );
        }
    }
}

#[async_trait]
impl QueueService for InMemoryQueueService {
    async fn create_queue(&self, name: &str) -> Result<QueueUrl, MessagingError> {
        if let Some(existing) = self.queues.get(name) {
            return Ok(existing.url.clone());
        }
        let url = QueueUrl::new(format!("memory://queues/{name}"));
        let queue = Arc::new(InMemoryQueue {
            url: url.clone(),
            created_at: Utc::now(),
            state: Mutex::new(QueueState::default()),
            arrivals: Notify::new(),
        });
        // entry() guards the create/create race; first writer wins
        let entry = self
            .queues
            .entry(name.to_string())
            .or_insert_with(|| queue);
        Ok(entry.url.clone())
    }

    async fn delete_queue(&self, url: &QueueUrl) -> Result<(), MessagingError> {
        self.queues
            .remove(url.queue_name())
            .map(|_| ())
            .ok_or_else(|| MessagingError::queue_not_found(url.queue_name()))
    }

    async fn queue_url(&self, name: &str) -> Result<Option<QueueUrl>, MessagingError> {
        Ok(self.queues.get(name).map(|q| q.url.clone()))
    }

    async fn list_queues(&self, prefix: &str) -> Result<Vec<QueueInfo>, MessagingError> {
        let mut infos: Vec<QueueInfo> = Vec::new();
        for entry in self.queues.iter() {
            if entry.key().starts_with(prefix) {
                let tags = entry.value().state.lock().await.tags.clone();
                infos.push(QueueInfo {
                    name: entry.key().clone(),
                    url: entry.value().url.clone(),
                    created_at: entry.value().created_at,
                    tags,
                });
            }
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn set_redrive_policy(
        &self,
        url: &QueueUrl,
        policy: &RedrivePolicy,
    ) -> Result<(), MessagingError> {
        let queue = self.queue_by_url(url)?;
        queue.state.lock().await.redrive = Some(policy.clone());
        Ok(())
    }

    async fn tag_queue(&self, url: &QueueUrl, tags: &QueueTags) -> Result<(), MessagingError> {
        let queue = self.queue_by_url(url)?;
        let mut state = queue.state.lock().await;
        for (k, v) in tags {
            state.tags.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn send_message(
        &self,
        url: &QueueUrl,
        payload: &QueuePayload,
        attributes: &MessageAttributes,
    ) -> Result<MessageId, MessagingError> {
        let queue = self.queue_by_url(url)?;
        let body = serde_json::to_value(payload)
            .map_err(|e| MessagingError::serialization(e.to_string()))?;
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);

        let mut state = queue.state.lock().await;
        state.messages.push_back(StoredMessage {
            seq,
            body,
            attributes: attributes.clone(),
            enqueued_at: Utc::now(),
            visible_at: Instant::now(),
            receive_count: 0,
        });
        drop(state);
        queue.arrivals.notify_waiters();

        Ok(MessageId::from(seq))
    }

    async fn receive_messages(
        &self,
        url: &QueueUrl,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueuedMessage>, MessagingError> {
        let queue = self.queue_by_url(url)?;
        let deadline = Instant::now() + wait;

        loop {
            let mut redriven: Vec<(RedrivePolicy, StoredMessage)> = Vec::new();
            let mut received: Vec<QueuedMessage> = Vec::new();
            {
                let mut state = queue.state.lock().await;
                let now = Instant::now();
                let redrive = state.redrive.clone();

                let mut idx = 0;
                while idx < state.messages.len() && received.len() < max_messages {
                    if state.messages[idx].visible_at > now {
                        idx += 1;
                        continue;
                    }

                    let exhausted = redrive.as_ref().is_some_and(|p| {
                        state.messages[idx].receive_count + 1 > p.max_receive_count
                    });
                    if exhausted {
                        let msg = state.messages.remove(idx).expect("index in bounds");
                        redriven.push((redrive.clone().expect("redrive present"), msg));
                        continue;
                    }

                    let msg = &mut state.messages[idx];
                    msg.receive_count += 1;
                    msg.visible_at = now + self.visibility_timeout;
                    received.push(QueuedMessage {
                        body: msg.body.clone(),
                        attributes: msg.attributes.clone(),
                        receipt_handle: ReceiptHandle::new(msg.seq.to_string()),
                        metadata: MessageMetadata {
                            receive_count: msg.receive_count,
                            enqueued_at: msg.enqueued_at,
                        },
                    });
                    idx += 1;
                }
            }

            for (policy, msg) in redriven {
                self.redrive_message(&policy, msg).await;
            }

            if !received.is_empty() {
                return Ok(received);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            let _ = tokio::time::timeout(remaining.min(WAIT_SLICE), queue.arrivals.notified())
                .await;
        }
    }

    async fn delete_message(
        &self,
        url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let seq = receipt
            .as_i64()
            .ok_or_else(|| MessagingError::InvalidReceiptHandle(receipt.as_str().to_string()))?;
        let queue = self.queue_by_url(url)?;
        let mut state = queue.state.lock().await;
        let before = state.messages.len();
        state.messages.retain(|m| m.seq != seq);
        if state.messages.len() == before {
            // Already deleted or redelivered-and-deleted; treat as success
            // (at-least-once delivery makes double-deletes routine)
            debug!(queue = %url, receipt = %receipt.as_str(), "Delete found no message");
        }
        Ok(())
    }

    async fn queue_stats(&self, url: &QueueUrl) -> Result<QueueStats, MessagingError> {
        let queue = self.queue_by_url(url)?;
        let state = queue.state.lock().await;
        let now = Utc::now();
        let oldest_ms = state
            .messages
            .iter()
            .map(|m| (now - m.enqueued_at).num_milliseconds().max(0) as u64)
            .max();

        let mut stats = QueueStats::new(url.queue_name(), state.messages.len() as u64);
        if let Some(age) = oldest_ms {
            stats = stats.with_oldest_message_age_ms(age);
        }
        Ok(stats)
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
