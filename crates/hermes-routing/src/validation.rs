//! # Message Validation
//!
//! Gate between message construction and the first queue write. A failing
//! validation is permanent: the message is dropped, nothing is enqueued,
//! and no pending entry is created.
//!
//! Rejections:
//! - missing `sessionId`, tenant key, or `timestamp`
//! - the `unknown` marker user or a `test-*` sentinel project (fixtures
//!   leaking into production)
//! - work messages with an empty instruction or repo URL
//! - responses without a command id or with a non-boolean `success`

use hermes_shared::messaging::WorkMessage;
use hermes_shared::{HermesError, HermesResult};

/// Marker user id that flags an unresolved or fixture tenant
const UNKNOWN_MARKER: &str = "unknown";

/// Sentinel project prefix used by test fixtures
const TEST_SENTINEL_PREFIX: &str = "test-";

/// Validate a fully built work message before any queue write
pub fn validate_work_message(message: &WorkMessage) -> HermesResult<()> {
    if message.session_id.trim().is_empty() {
        return Err(HermesError::Validation("missing sessionId".to_string()));
    }
    validate_tenant_markers(&message.tenant.project_id, &message.tenant.user_id)?;
    if message.instruction.trim().is_empty() {
        return Err(HermesError::Validation(
            "work message with empty instruction".to_string(),
        ));
    }
    match message.repo_url.as_deref() {
        Some(url) if !url.trim().is_empty() => {}
        _ => {
            return Err(HermesError::Validation(
                "work message with empty repoUrl".to_string(),
            ))
        }
    }
    Ok(())
}

/// Validate a raw wire payload (used at the ingress edge and by tooling)
pub fn validate_payload(value: &serde_json::Value) -> HermesResult<()> {
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| HermesError::Validation("missing type discriminant".to_string()))?;

    let tenant = value
        .get("tenantKey")
        .ok_or_else(|| HermesError::Validation("missing tenantKey".to_string()))?;
    let project = tenant.get("projectId").and_then(|v| v.as_str());
    let user = tenant.get("userId").and_then(|v| v.as_str());
    match (project, user) {
        (Some(project), Some(user)) if !project.is_empty() && !user.is_empty() => {
            validate_tenant_markers(project, user)?;
        }
        _ => return Err(HermesError::Validation("incomplete tenantKey".to_string())),
    }

    if value.get("timestamp").and_then(|t| t.as_str()).is_none() {
        return Err(HermesError::Validation("missing timestamp".to_string()));
    }

    match kind {
        "work" => {
            if non_empty_str(value, "sessionId").is_none() {
                return Err(HermesError::Validation("missing sessionId".to_string()));
            }
            if non_empty_str(value, "instruction").is_none() {
                return Err(HermesError::Validation(
                    "work message with empty instruction".to_string(),
                ));
            }
            if non_empty_str(value, "repoUrl").is_none() {
                return Err(HermesError::Validation(
                    "work message with empty repoUrl".to_string(),
                ));
            }
        }
        "response" => {
            if non_empty_str(value, "commandId").is_none() {
                return Err(HermesError::Validation(
                    "response without commandId".to_string(),
                ));
            }
            if value.get("success").map(|s| !s.is_boolean()).unwrap_or(true) {
                return Err(HermesError::Validation(
                    "response with non-boolean success".to_string(),
                ));
            }
        }
        "claim_request" | "interrupt" => {}
        other => {
            return Err(HermesError::Validation(format!(
                "unrecognized type discriminant: {other}"
            )))
        }
    }
    Ok(())
}

fn validate_tenant_markers(project_id: &str, user_id: &str) -> HermesResult<()> {
    if user_id == UNKNOWN_MARKER {
        return Err(HermesError::Validation(format!(
            "marker tenant rejected: {project_id}#{user_id}"
        )));
    }
    if project_id.starts_with(TEST_SENTINEL_PREFIX) {
        return Err(HermesError::Validation(format!(
            "sentinel test tenant rejected: {project_id}#{user_id}"
        )));
    }
    Ok(())
}

fn non_empty_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hermes_shared::types::{TenantKey, ThreadId, Transport};
    use serde_json::json;
    use uuid::Uuid;

    fn work() -> WorkMessage {
        WorkMessage {
            command_id: Uuid::new_v4(),
            session_id: "sess-1".to_string(),
            tenant: TenantKey::new("amelia", "scott").unwrap(),
            thread_id: ThreadId::new("aBcD1234"),
            instruction: "update homepage".to_string(),
            repo_url: Some("https://github.com/amelia/site.git".to_string()),
            user_email: None,
            source: Transport::Email,
            timestamp: Utc::now(),
            context: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_valid_work_message_passes() {
        assert!(validate_work_message(&work()).is_ok());
    }

    #[test]
    fn test_empty_instruction_rejected() {
        let mut msg = work();
        msg.instruction = "   ".to_string();
        let err = validate_work_message(&msg).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_missing_repo_url_rejected() {
        let mut msg = work();
        msg.repo_url = None;
        assert!(validate_work_message(&msg).is_err());
        msg.repo_url = Some(String::new());
        assert!(validate_work_message(&msg).is_err());
    }

    #[test]
    fn test_missing_session_rejected() {
        let mut msg = work();
        msg.session_id = String::new();
        assert!(validate_work_message(&msg).is_err());
    }

    #[test]
    fn test_unknown_marker_rejected() {
        let mut msg = work();
        msg.tenant = TenantKey::fallback();
        let err = validate_work_message(&msg).unwrap_err();
        assert!(err.to_string().contains("marker tenant"));
    }

    #[test]
    fn test_sentinel_project_rejected() {
        let mut msg = work();
        msg.tenant = TenantKey::new("test-fixture", "scott").unwrap();
        assert!(validate_work_message(&msg).is_err());
    }

    #[test]
    fn test_wire_work_payload() {
        let valid = json!({
            "type": "work",
            "sessionId": "sess-1",
            "tenantKey": {"projectId": "amelia", "userId": "scott"},
            "timestamp": "2026-01-01T00:00:00Z",
            "instruction": "update homepage",
            "repoUrl": "https://github.com/amelia/site.git"
        });
        assert!(validate_payload(&valid).is_ok());

        let mut missing_ts = valid.clone();
        missing_ts.as_object_mut().unwrap().remove("timestamp");
        assert!(validate_payload(&missing_ts).is_err());
    }

    #[test]
    fn test_wire_response_payload() {
        let valid = json!({
            "type": "response",
            "commandId": Uuid::new_v4().to_string(),
            "tenantKey": {"projectId": "amelia", "userId": "scott"},
            "timestamp": "2026-01-01T00:00:00Z",
            "success": true
        });
        assert!(validate_payload(&valid).is_ok());

        let mut string_success = valid.clone();
        string_success["success"] = json!("true");
        let err = validate_payload(&string_success).unwrap_err();
        assert!(err.to_string().contains("non-boolean"));

        let mut no_command = valid;
        no_command.as_object_mut().unwrap().remove("commandId");
        assert!(validate_payload(&no_command).is_err());
    }

    #[test]
    fn test_wire_unknown_discriminant() {
        let payload = json!({
            "type": "mystery",
            "tenantKey": {"projectId": "amelia", "userId": "scott"},
            "timestamp": "2026-01-01T00:00:00Z"
        });
        assert!(validate_payload(&payload).is_err());
    }
}
