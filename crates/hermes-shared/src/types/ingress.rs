//! # Ingress Messages
//!
//! The tagged message value handed to the core by a transport adapter. The
//! adapter decodes bytes; the core never sees raw transport payloads except
//! through the forward-only `raw` envelope carried for context.
//!
//! One variant per transport. The extractor dispatches on the variant; the
//! resolver only uses the common accessors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message transport a conversation arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Email,
    Sms,
    Chat,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => f.write_str("email"),
            Self::Sms => f.write_str("sms"),
            Self::Chat => f.write_str("chat"),
        }
    }
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "chat" => Ok(Self::Chat),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

/// Email ingress payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailIngress {
    /// Sender address, used for identity lookup
    pub from: String,
    /// `References` header entries, oldest first
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub in_reply_to: Option<String>,
    pub message_id: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub body: String,
}

/// SMS ingress payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsIngress {
    pub from: String,
    pub to: String,
    /// Provider conversation identifier, when the transport threads messages
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub body: String,
}

/// Chat ingress payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatIngress {
    pub user_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub message_id: String,
    pub body: String,
}

/// Tagged ingress message produced by a transport adapter
///
/// Common fields (`session_id`, `raw`) ride alongside the per-transport
/// payload so replays keep the full original envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressMessage {
    #[serde(flatten)]
    pub payload: IngressPayload,
    /// Session identifier, when the ingress edge already established one
    #[serde(default)]
    pub session_id: Option<String>,
    /// Thread identifier already hashed by an upstream hop, if any
    #[serde(default)]
    pub thread_id_hint: Option<String>,
    /// Forward-only opaque envelope, copied verbatim into work context
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Per-transport ingress payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum IngressPayload {
    Email(EmailIngress),
    Sms(SmsIngress),
    Chat(ChatIngress),
}

impl IngressMessage {
    pub fn transport(&self) -> Transport {
        match &self.payload {
            IngressPayload::Email(_) => Transport::Email,
            IngressPayload::Sms(_) => Transport::Sms,
            IngressPayload::Chat(_) => Transport::Chat,
        }
    }

    /// Sender identity used for tenant-config lookup
    pub fn sender_identity(&self) -> &str {
        match &self.payload {
            IngressPayload::Email(e) => &e.from,
            IngressPayload::Sms(s) => &s.from,
            IngressPayload::Chat(c) => &c.user_id,
        }
    }

    /// The user's instruction text
    pub fn instruction(&self) -> &str {
        match &self.payload {
            IngressPayload::Email(e) => &e.body,
            IngressPayload::Sms(s) => &s.body,
            IngressPayload::Chat(c) => &c.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_message() -> IngressMessage {
        IngressMessage {
            payload: IngressPayload::Email(EmailIngress {
                from: "escottster@gmail.com".to_string(),
                references: vec!["<abc@x>".to_string()],
                in_reply_to: None,
                message_id: "<msg-1@x>".to_string(),
                subject: Some("Re: homepage".to_string()),
                body: "update homepage".to_string(),
            }),
            session_id: None,
            thread_id_hint: None,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_transport_and_identity() {
        let msg = email_message();
        assert_eq!(msg.transport(), Transport::Email);
        assert_eq!(msg.sender_identity(), "escottster@gmail.com");
        assert_eq!(msg.instruction(), "update homepage");
    }

    #[test]
    fn test_serde_tagged_source() {
        let msg = email_message();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["source"], "email");
        let back: IngressMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back.sender_identity(), "escottster@gmail.com");
    }

    #[test]
    fn test_sms_payload_optional_conversation() {
        let json = serde_json::json!({
            "source": "sms",
            "from": "+15550001111",
            "to": "+15559990000",
            "body": "change the banner"
        });
        let msg: IngressMessage = serde_json::from_value(json).unwrap();
        assert_eq!(msg.transport(), Transport::Sms);
        match msg.payload {
            IngressPayload::Sms(ref s) => assert!(s.conversation_id.is_none()),
            _ => panic!("expected sms payload"),
        }
    }

    #[test]
    fn test_transport_display() {
        assert_eq!(Transport::Email.to_string(), "email");
        assert_eq!(Transport::Sms.to_string(), "sms");
        assert_eq!(Transport::Chat.to_string(), "chat");
    }
}
