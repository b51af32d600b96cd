//! SMS adapter. Accepts the webhook JSON shape most SMS providers emit
//! (capitalized Twilio-style keys included).

use serde::Deserialize;

use hermes_shared::types::{IngressMessage, IngressPayload, SmsIngress};
use hermes_shared::{HermesError, HermesResult};

use crate::parse_json;

#[derive(Debug, Deserialize)]
struct RawSms {
    #[serde(alias = "From")]
    from: String,
    #[serde(alias = "To")]
    to: String,
    #[serde(default, alias = "ConversationSid", alias = "conversationId")]
    conversation_id: Option<String>,
    #[serde(alias = "Body")]
    body: String,
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
}

/// Decoder for SMS ingress payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct SmsAdapter;

impl SmsAdapter {
    /// Decode a raw SMS webhook payload into an ingress message
    pub fn decode(payload: &[u8]) -> HermesResult<IngressMessage> {
        let raw = parse_json(payload)?;
        let sms: RawSms = serde_json::from_value(raw.clone())
            .map_err(|e| HermesError::Validation(format!("malformed sms payload: {e}")))?;

        Ok(IngressMessage {
            payload: IngressPayload::Sms(SmsIngress {
                from: sms.from,
                to: sms.to,
                conversation_id: sms.conversation_id,
                body: sms.body,
            }),
            session_id: sms.session_id,
            thread_id_hint: None,
            raw,
        })
    }
}
