//! Chat adapter. Accepts the generic shape chat integrations post
//! (Slack-style `thread_ts`/`ts` aliases included).

use serde::Deserialize;

use hermes_shared::types::{ChatIngress, IngressMessage, IngressPayload};
use hermes_shared::{HermesError, HermesResult};

use crate::parse_json;

#[derive(Debug, Deserialize)]
struct RawChat {
    #[serde(alias = "user", alias = "userId")]
    user_id: String,
    #[serde(default, alias = "threadId", alias = "thread_ts")]
    thread_id: Option<String>,
    #[serde(alias = "messageId", alias = "ts")]
    message_id: String,
    #[serde(alias = "text", alias = "body")]
    message: String,
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
}

/// Decoder for chat ingress payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatAdapter;

impl ChatAdapter {
    /// Decode a raw chat event payload into an ingress message
    pub fn decode(payload: &[u8]) -> HermesResult<IngressMessage> {
        let raw = parse_json(payload)?;
        let chat: RawChat = serde_json::from_value(raw.clone())
            .map_err(|e| HermesError::Validation(format!("malformed chat payload: {e}")))?;

        Ok(IngressMessage {
            payload: IngressPayload::Chat(ChatIngress {
                user_id: chat.user_id,
                thread_id: chat.thread_id,
                message_id: chat.message_id,
                body: chat.message,
            }),
            session_id: chat.session_id,
            thread_id_hint: None,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_shared::types::Transport;

    #[test]
    fn test_decode_slack_style() {
        let payload = serde_json::json!({
            "user": "U123",
            "thread_ts": "1714.0001",
            "ts": "1714.0002",
            "text": "swap the logo"
        });
        let msg = ChatAdapter::decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(msg.transport(), Transport::Chat);
        match msg.payload {
            IngressPayload::Chat(ref c) => {
                assert_eq!(c.thread_id.as_deref(), Some("1714.0001"));
                assert_eq!(c.user_id, "U123");
            }
            _ => panic!("expected chat payload"),
        }
    }

    #[test]
    fn test_decode_session_passthrough() {
        let payload = serde_json::json!({
            "userId": "U123",
            "messageId": "M1",
            "body": "swap the logo",
            "sessionId": "sess-9"
        });
        let msg = ChatAdapter::decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(msg.session_id.as_deref(), Some("sess-9"));
    }

    #[test]
    fn test_decode_rejects_missing_user() {
        let payload = serde_json::json!({"messageId": "M1", "text": "hi"});
        assert!(ChatAdapter::decode(payload.to_string().as_bytes()).is_err());
    }
}
