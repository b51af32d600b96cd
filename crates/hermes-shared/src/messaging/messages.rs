//! # Queue Wire Formats
//!
//! Every queue payload is a JSON object discriminated by its `type` field:
//! `work`, `claim_request`, `response`, and `interrupt`. Message attributes
//! (tenancy, source, priority) travel alongside the JSON body and are
//! preserved end to end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{TenantKey, ThreadId, Transport};

/// Delivery priority carried as a message attribute
///
/// Interrupt messages are sent `High` so a worker drops current work before
/// draining the rest of its input queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// Attributes preserved alongside the JSON body of every queue message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttributes {
    #[serde(rename = "projectId")]
    pub project_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub source: String,
    #[serde(rename = "Priority")]
    pub priority: Priority,
}

impl MessageAttributes {
    pub fn new(tenant: &TenantKey, source: Transport, priority: Priority) -> Self {
        Self {
            project_id: tenant.project_id.clone(),
            user_id: tenant.user_id.clone(),
            source: source.to_string(),
            priority,
        }
    }
}

/// Payload delivered to a tenant's input queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkMessage {
    pub command_id: Uuid,
    pub session_id: String,
    #[serde(rename = "tenantKey")]
    pub tenant: TenantKey,
    pub thread_id: ThreadId,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub source: Transport,
    pub timestamp: DateTime<Utc>,
    /// Opaque forwarded envelope from the ingress edge
    #[serde(default)]
    pub context: serde_json::Value,
}

/// Ownership invitation published on the shared unclaimed queue
///
/// Carries no instruction payload; the cross-referenced command id lets a
/// claiming worker short-circuit the handoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    #[serde(rename = "tenantKey")]
    pub tenant: TenantKey,
    pub command_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Payload a worker writes to a tenant's output queue
///
/// Correlation is by `command_id` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMessage {
    pub command_id: Uuid,
    pub session_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted_by: Option<Uuid>,
    pub completed_at: DateTime<Utc>,
}

impl ResponseMessage {
    /// Synthesize the response delivered when newer work preempts a command
    pub fn interrupted(
        command_id: Uuid,
        session_id: String,
        interrupted_by: Option<Uuid>,
        reason: &str,
    ) -> Self {
        Self {
            command_id,
            session_id,
            success: false,
            summary: Some(format!("Interrupted: {reason}")),
            files_changed: None,
            error: None,
            interrupted: true,
            interrupted_by,
            completed_at: Utc::now(),
        }
    }
}

/// High-priority signal telling a worker to drop its current command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterruptMessage {
    #[serde(rename = "tenantKey")]
    pub tenant: TenantKey,
    /// The command that preempted the in-flight work
    pub interrupted_by: Uuid,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Every payload the core reads or writes, discriminated by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueuePayload {
    Work(WorkMessage),
    ClaimRequest(ClaimRequest),
    Response(ResponseMessage),
    Interrupt(InterruptMessage),
}

impl QueuePayload {
    /// The discriminant string as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Work(_) => "work",
            Self::ClaimRequest(_) => "claim_request",
            Self::Response(_) => "response",
            Self::Interrupt(_) => "interrupt",
        }
    }

    /// The command id this payload correlates to, if any
    pub fn command_id(&self) -> Option<Uuid> {
        match self {
            Self::Work(w) => Some(w.command_id),
            Self::ClaimRequest(c) => Some(c.command_id),
            Self::Response(r) => Some(r.command_id),
            Self::Interrupt(i) => Some(i.interrupted_by),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantKey {
        TenantKey::new("amelia", "scott").unwrap()
    }

    fn work_message() -> WorkMessage {
        WorkMessage {
            command_id: Uuid::new_v4(),
            session_id: "sess-1".to_string(),
            tenant: tenant(),
            thread_id: ThreadId::new("aBcD1234"),
            instruction: "update homepage".to_string(),
            repo_url: Some("https://github.com/amelia/site.git".to_string()),
            user_email: Some("escottster@gmail.com".to_string()),
            source: Transport::Email,
            timestamp: Utc::now(),
            context: serde_json::json!({"messageId": "<m@x>"}),
        }
    }

    #[test]
    fn test_work_message_wire_shape() {
        let payload = QueuePayload::Work(work_message());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "work");
        assert_eq!(json["tenantKey"]["projectId"], "amelia");
        assert!(json["commandId"].is_string());
        assert_eq!(json["instruction"], "update homepage");
    }

    #[test]
    fn test_claim_request_wire_shape() {
        let payload = QueuePayload::ClaimRequest(ClaimRequest {
            tenant: tenant(),
            command_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "claim_request");
        assert!(json.get("instruction").is_none());
    }

    #[test]
    fn test_response_roundtrip() {
        let original = ResponseMessage {
            command_id: Uuid::new_v4(),
            session_id: "sess-1".to_string(),
            success: true,
            summary: Some("done".to_string()),
            files_changed: Some(vec!["index.html".to_string()]),
            error: None,
            interrupted: false,
            interrupted_by: None,
            completed_at: Utc::now(),
        };
        let json = serde_json::to_value(QueuePayload::Response(original.clone())).unwrap();
        let parsed: QueuePayload = serde_json::from_value(json).unwrap();
        match parsed {
            QueuePayload::Response(r) => {
                assert_eq!(r.command_id, original.command_id);
                assert!(r.success);
            }
            other => panic!("expected response, got {}", other.kind()),
        }
    }

    #[test]
    fn test_interrupted_response_summary() {
        let by = Uuid::new_v4();
        let r = ResponseMessage::interrupted(Uuid::new_v4(), "sess-1".into(), Some(by), "new work");
        assert!(r.interrupted);
        assert_eq!(r.interrupted_by, Some(by));
        assert_eq!(r.summary.as_deref(), Some("Interrupted: new work"));
        assert!(!r.success);
    }

    #[test]
    fn test_attributes_priority_wire_names() {
        let attrs = MessageAttributes::new(&tenant(), Transport::Email, Priority::High);
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json["projectId"], "amelia");
        assert_eq!(json["userId"], "scott");
        assert_eq!(json["Priority"], "high");
        assert_eq!(json["source"], "email");
    }

    #[test]
    fn test_payload_command_id_accessor() {
        let work = work_message();
        let id = work.command_id;
        assert_eq!(QueuePayload::Work(work).command_id(), Some(id));
    }
}
