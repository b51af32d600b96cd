//! # Queue Service Types
//!
//! Provider-agnostic value types for the queue service layer. URLs are the
//! stable handles the registry persists; receipt handles are opaque and
//! provider-specific.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::super::messages::{MessageAttributes, QueuePayload};
use crate::messaging::MessagingError;

/// Stable handle for a queue, persisted in the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueUrl(String);

impl QueueUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment of the URL: the queue name
    pub fn queue_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider-assigned identifier for a sent message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Opaque handle used to delete (acknowledge) a received message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form for providers with integer message ids
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

/// Delivery metadata attached to a received message
#[derive(Debug, Clone)]
pub struct MessageMetadata {
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// A message pulled from a queue
///
/// The body is kept as raw JSON so a malformed payload never fails the
/// whole batch; consumers parse via [`QueuedMessage::parse_payload`] and
/// decide per message whether to discard.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub body: serde_json::Value,
    pub attributes: MessageAttributes,
    pub receipt_handle: ReceiptHandle,
    pub metadata: MessageMetadata,
}

impl QueuedMessage {
    pub fn parse_payload(&self) -> Result<QueuePayload, MessagingError> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| MessagingError::serialization(e.to_string()))
    }
}

/// Tenancy tags applied to every managed queue
pub type QueueTags = BTreeMap<String, String>;

/// Build the standard tag set for a managed queue
pub fn managed_tags(project_id: &str, tenant_canonical: &str) -> QueueTags {
    QueueTags::from([
        ("project".to_string(), project_id.to_string()),
        ("tenant".to_string(), tenant_canonical.to_string()),
        ("managedBy".to_string(), "hermes".to_string()),
    ])
}

/// Redrive configuration from an input queue to its DLQ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedrivePolicy {
    pub dead_letter_url: QueueUrl,
    pub max_receive_count: u32,
}

/// Descriptor returned by queue enumeration
#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub name: String,
    pub url: QueueUrl,
    pub created_at: DateTime<Utc>,
    pub tags: QueueTags,
}

/// Point-in-time queue statistics
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub queue_name: String,
    pub message_count: u64,
    pub oldest_message_age_ms: Option<u64>,
}

impl QueueStats {
    pub fn new(queue_name: impl Into<String>, message_count: u64) -> Self {
        Self {
            queue_name: queue_name.into(),
            message_count,
            oldest_message_age_ms: None,
        }
    }

    pub fn with_oldest_message_age_ms(mut self, age_ms: u64) -> Self {
        self.oldest_message_age_ms = Some(age_ms);
        self
    }
}

/// The three queue URLs allocated to a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueTriplet {
    pub input_url: QueueUrl,
    pub output_url: QueueUrl,
    pub dlq_url: QueueUrl,
}
