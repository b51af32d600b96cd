//! Email adapter. Consumes the JSON the mail edge emits after MIME
//! parsing; header casing and `References` shape (array or the raw
//! whitespace-joined header value) both appear in the wild.

use serde::Deserialize;

use hermes_shared::types::{EmailIngress, IngressMessage, IngressPayload};
use hermes_shared::{HermesError, HermesResult};

use crate::parse_json;

#[derive(Debug, Deserialize)]
struct RawEmail {
    #[serde(alias = "From")]
    from: String,
    #[serde(default, alias = "References")]
    references: Option<serde_json::Value>,
    #[serde(default, alias = "inReplyTo", alias = "In-Reply-To")]
    in_reply_to: Option<String>,
    #[serde(alias = "messageId", alias = "Message-ID")]
    message_id: String,
    #[serde(default, alias = "Subject")]
    subject: Option<String>,
    #[serde(alias = "Body", alias = "text")]
    body: String,
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
}

/// Decoder for email ingress payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailAdapter;

impl EmailAdapter {
    /// Decode a raw email payload into an ingress message
    pub fn decode(payload: &[u8]) -> HermesResult<IngressMessage> {
        let raw = parse_json(payload)?;
        let email: RawEmail = serde_json::from_value(raw.clone())
            .map_err(|e| HermesError::Validation(format!("malformed email payload: {e}")))?;

        Ok(IngressMessage {
            payload: IngressPayload::Email(EmailIngress {
                from: email.from,
                references: parse_references(email.references.as_ref()),
                in_reply_to: email.in_reply_to,
                message_id: email.message_id,
                subject: email.subject,
                body: email.body,
            }),
            session_id: email.session_id,
            thread_id_hint: None,
            raw,
        })
    }
}

/// `References` arrives as a JSON array or the raw header string
fn parse_references(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(String::from)
            .collect(),
        Some(serde_json::Value::String(header)) => header
            .split_whitespace()
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}
