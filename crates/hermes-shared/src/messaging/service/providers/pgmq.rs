//! # PGMQ Queue Service
//!
//! PostgreSQL-backed queue provider over the `pgmq` client crate's
//! extension API (`PGMQueueExt`). Queue operations - create, send, read,
//! archive, delete, drop, metrics, enumeration - all go through the
//! client; the provider adds the platform concerns PGMQ does not model:
//! queue tags, redrive policies, and creation timestamps live in the
//! `hermes_queue_metadata` side table, bootstrapped by
//! [`PgmqQueueService::ensure_schema`].
//!
//! ## Name mapping
//!
//! PGMQ restricts queue identifiers to `[A-Za-z0-9_]`, while the platform
//! naming scheme uses `-`. The provider maps public names to internal
//! identifiers by swapping `-` for `_` (and back on enumeration). Tenant
//! components never contain `_`, so the mapping is unambiguous for managed
//! queues.
//!
//! ## Attributes
//!
//! PGMQ messages carry only a JSONB body, so attributes ride in an
//! envelope `{"body": ..., "attributes": ...}`.
//!
//! ## Acknowledge = archive
//!
//! Deleting (acknowledging) a processed message archives it rather than
//! dropping it, keeping PGMQ's audit trail intact. Redrive-discarded
//! messages are deleted outright after being copied to the DLQ.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgmq::PGMQueueExt;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use super::super::traits::QueueService;
use super::super::types::{
    MessageId, MessageMetadata, QueueInfo, QueueStats, QueueTags, QueueUrl, QueuedMessage,
    ReceiptHandle, RedrivePolicy,
};
use crate::messaging::messages::{MessageAttributes, Priority, QueuePayload};
use crate::messaging::MessagingError;

/// Poll slice used to emulate long-poll waits over non-blocking reads
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Visibility timeout applied to every read
const VISIBILITY_TIMEOUT_SECONDS: i32 = 30;

/// Connection budget for the PGMQ client pool
const QUEUE_POOL_CONNECTIONS: u32 = 10;

/// Connection budget for the metadata side-table pool
const METADATA_POOL_CONNECTIONS: u32 = 5;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    body: serde_json::Value,
    #[serde(default)]
    attributes: Option<MessageAttributes>,
}

fn neutral_attributes() -> MessageAttributes {
    MessageAttributes {
        project_id: String::new(),
        user_id: String::new(),
        source: String::new(),
        priority: Priority::Normal,
    }
}

/// PGMQ implementation of [`QueueService`]
#[derive(Clone)]
pub struct PgmqQueueService {
    /// PGMQ extension client
    queue: Arc<PGMQueueExt>,
    /// Pool for the queue metadata side table
    pool: PgPool,
}

impl fmt::Debug for PgmqQueueService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgmqQueueService").finish_non_exhaustive()
    }
}

impl PgmqQueueService {
    /// Connect the PGMQ client, initialize the extension, and bootstrap
    /// the metadata table
    pub async fn new(database_url: &str) -> Result<Self, MessagingError> {
        let queue = PGMQueueExt::new(database_url.to_string(), QUEUE_POOL_CONNECTIONS)
            .await
            .map_err(|e| MessagingError::connection(e.to_string()))?;
        queue
            .init()
            .await
            .map_err(|e| MessagingError::connection(format!("pgmq init failed: {e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(METADATA_POOL_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(|e| MessagingError::connection(e.to_string()))?;

        let service = Self {
            queue: Arc::new(queue),
            pool,
        };
        service.ensure_schema().await?;
        Ok(service)
    }

    /// Pool backing the metadata side table
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the queue metadata side table if it does not exist
    pub async fn ensure_schema(&self) -> Result<(), MessagingError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS hermes_queue_metadata (
                queue_name TEXT PRIMARY KEY,
                tags JSONB NOT NULL DEFAULT '{}'::jsonb,
                redrive JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MessagingError::connection(format!("schema bootstrap failed: {e}")))?;
        Ok(())
    }

    fn internal_name(public: &str) -> String {
        public.replace('-', "_")
    }

    fn public_name(internal: &str) -> String {
        internal.replace('_', "-")
    }

    async fn redrive_policy(&self, name: &str) -> Result<Option<RedrivePolicy>, MessagingError> {
        let row = sqlx::query("SELECT redrive FROM hermes_queue_metadata WHERE queue_name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_stats(name, e.to_string()))?;

        Ok(row
            .and_then(|r| r.try_get::<Option<serde_json::Value>, _>("redrive").ok())
            .flatten()
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    /// One non-blocking PGMQ batch read
    async fn read_once(
        &self,
        name: &str,
        max_messages: usize,
        redrive: Option<&RedrivePolicy>,
    ) -> Result<Vec<QueuedMessage>, MessagingError> {
        let messages = self
            .queue
            .read_batch::<serde_json::Value>(
                &Self::internal_name(name),
                VISIBILITY_TIMEOUT_SECONDS,
                max_messages as i32,
            )
            .await
            .map_err(|e| MessagingError::receive(name, e.to_string()))?;

        let mut received = Vec::with_capacity(messages.len());
        for msg in messages {
            if let Some(policy) = redrive {
                if msg.read_ct.max(0) as u32 > policy.max_receive_count {
                    self.move_to_dlq(name, msg.msg_id, &msg.message, policy).await;
                    continue;
                }
            }

            let envelope: Envelope =
                serde_json::from_value(msg.message.clone()).unwrap_or(Envelope {
                    body: msg.message,
                    attributes: None,
                });

            received.push(QueuedMessage {
                body: envelope.body,
                attributes: envelope.attributes.unwrap_or_else(neutral_attributes),
                receipt_handle: ReceiptHandle::new(msg.msg_id.to_string()),
                metadata: MessageMetadata {
                    receive_count: msg.read_ct.max(0) as u32,
                    enqueued_at: msg.enqueued_at,
                },
            });
        }
        Ok(received)
    }

    /// Move a receive-exhausted message onto the queue's DLQ
    async fn move_to_dlq(
        &self,
        queue: &str,
        msg_id: i64,
        message: &serde_json::Value,
        policy: &RedrivePolicy,
    ) {
        let dlq = Self::internal_name(policy.dead_letter_url.queue_name());
        let moved: Result<(), pgmq::errors::PgmqError> = async {
            self.queue.send(&dlq, message).await?;
            self.queue
                .delete(&Self::internal_name(queue), msg_id)
                .await?;
            Ok(())
        }
        .await;

        match moved {
            Ok(()) => debug!(queue = %queue, msg_id, "Redrove exhausted message to DLQ"),
            Err(e) => warn!(queue = %queue, msg_id, error = %e, "Redrive to DLQ failed"),
        }
    }
}

#[async_trait]
impl QueueService for PgmqQueueService {
    async fn create_queue(&self, name: &str) -> Result<QueueUrl, MessagingError> {
        self.queue
            .create(&Self::internal_name(name))
            .await
            .map_err(|e| MessagingError::queue_creation(name, e.to_string()))?;

        sqlx::query(
            "INSERT INTO hermes_queue_metadata (queue_name) VALUES ($1)
             ON CONFLICT (queue_name) DO NOTHING",
        )
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(|e| MessagingError::queue_creation(name, e.to_string()))?;

        Ok(QueueUrl::new(format!("pgmq://{name}")))
    }

    async fn delete_queue(&self, url: &QueueUrl) -> Result<(), MessagingError> {
        let name = url.queue_name();
        self.queue
            .drop_queue(&Self::internal_name(name))
            .await
            .map_err(|e| MessagingError::queue_deletion(name, e.to_string()))?;

        sqlx::query("DELETE FROM hermes_queue_metadata WHERE queue_name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_deletion(name, e.to_string()))?;
        Ok(())
    }

    async fn queue_url(&self, name: &str) -> Result<Option<QueueUrl>, MessagingError> {
        let internal = Self::internal_name(name);
        let queues = self
            .queue
            .list_queues()
            .await
            .map_err(|e| MessagingError::queue_stats(name, e.to_string()))?
            .unwrap_or_default();

        Ok(queues
            .iter()
            .any(|q| q.queue_name == internal)
            .then(|| QueueUrl::new(format!("pgmq://{name}"))))
    }

    async fn list_queues(&self, prefix: &str) -> Result<Vec<QueueInfo>, MessagingError> {
        let internal_prefix = Self::internal_name(prefix);
        let queues = self
            .queue
            .list_queues()
            .await
            .map_err(|e| MessagingError::queue_stats(prefix, e.to_string()))?
            .unwrap_or_default();

        // Tags and creation timestamps come from the side table; PGMQ's own
        // created_at is the fallback for rows created out-of-band
        let rows = sqlx::query("SELECT queue_name, tags, created_at FROM hermes_queue_metadata")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MessagingError::internal(e.to_string()))?;
        let mut metadata: HashMap<String, (QueueTags, DateTime<Utc>)> = HashMap::new();
        for row in rows {
            let queue_name: String = row
                .try_get("queue_name")
                .map_err(|e| MessagingError::internal(e.to_string()))?;
            let created_at: DateTime<Utc> = row
                .try_get("created_at")
                .map_err(|e| MessagingError::internal(e.to_string()))?;
            let tags: QueueTags = row
                .try_get::<Option<serde_json::Value>, _>("tags")
                .ok()
                .flatten()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            metadata.insert(queue_name, (tags, created_at));
        }

        let mut infos = Vec::new();
        for meta in queues {
            if !meta.queue_name.starts_with(&internal_prefix) {
                continue;
            }
            let name = Self::public_name(&meta.queue_name);
            let (tags, created_at) = metadata
                .get(&name)
                .cloned()
                .unwrap_or_else(|| (QueueTags::default(), meta.created_at));
            infos.push(QueueInfo {
                url: QueueUrl::new(format!("pgmq://{name}")),
                name,
                created_at,
                tags,
            });
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn set_redrive_policy(
        &self,
        url: &QueueUrl,
        policy: &RedrivePolicy,
    ) -> Result<(), MessagingError> {
        let value = serde_json::to_value(policy)
            .map_err(|e| MessagingError::serialization(e.to_string()))?;
        sqlx::query(
            "INSERT INTO hermes_queue_metadata (queue_name, redrive) VALUES ($1, $2)
             ON CONFLICT (queue_name) DO UPDATE SET redrive = EXCLUDED.redrive",
        )
        .bind(url.queue_name())
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| MessagingError::internal(e.to_string()))?;
        Ok(())
    }

    async fn tag_queue(&self, url: &QueueUrl, tags: &QueueTags) -> Result<(), MessagingError> {
        let value = serde_json::to_value(tags)
            .map_err(|e| MessagingError::serialization(e.to_string()))?;
        sqlx::query(
            "INSERT INTO hermes_queue_metadata (queue_name, tags) VALUES ($1, $2)
             ON CONFLICT (queue_name) DO UPDATE
                SET tags = hermes_queue_metadata.tags || EXCLUDED.tags",
        )
        .bind(url.queue_name())
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| MessagingError::internal(e.to_string()))?;
        Ok(())
    }

    async fn send_message(
        &self,
        url: &QueueUrl,
        payload: &QueuePayload,
        attributes: &MessageAttributes,
    ) -> Result<MessageId, MessagingError> {
        let name = url.queue_name();
        let envelope = serde_json::to_value(Envelope {
            body: serde_json::to_value(payload)
                .map_err(|e| MessagingError::serialization(e.to_string()))?,
            attributes: Some(attributes.clone()),
        })
        .map_err(|e| MessagingError::serialization(e.to_string()))?;

        let msg_id = self
            .queue
            .send(&Self::internal_name(name), &envelope)
            .await
            .map_err(|e| MessagingError::send(name, e.to_string()))?;

        Ok(MessageId::from(msg_id))
    }

    async fn receive_messages(
        &self,
        url: &QueueUrl,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueuedMessage>, MessagingError> {
        let name = url.queue_name();
        let redrive = self.redrive_policy(name).await?;
        let deadline = Instant::now() + wait;

        loop {
            let received = self.read_once(name, max_messages, redrive.as_ref()).await?;
            if !received.is_empty() {
                return Ok(received);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            tokio::time::sleep(remaining.min(POLL_INTERVAL)).await;
        }
    }

    async fn delete_message(
        &self,
        url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let name = url.queue_name();
        let msg_id = receipt
            .as_i64()
            .ok_or_else(|| MessagingError::InvalidReceiptHandle(receipt.as_str().to_string()))?;

        // Archive rather than delete: acknowledged messages stay auditable
        self.queue
            .archive(&Self::internal_name(name), msg_id)
            .await
            .map_err(|e| MessagingError::delete(name, receipt.as_str(), e.to_string()))?;
        Ok(())
    }

    async fn queue_stats(&self, url: &QueueUrl) -> Result<QueueStats, MessagingError> {
        let name = url.queue_name();
        let metrics = self
            .queue
            .metrics(&Self::internal_name(name))
            .await
            .map_err(|e| MessagingError::queue_stats(name, e.to_string()))?;

        let mut stats = QueueStats::new(name, metrics.queue_length.max(0) as u64);
        if let Some(age) = metrics.oldest_msg_age_sec {
            stats = stats.with_oldest_message_age_ms((age.max(0) as u64) * 1000);
        }
        Ok(stats)
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::health_check(e.to_string()))?;
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}
