//! # Hermes Ingress Adapters
//!
//! Thin decoders from raw transport payloads (already parsed out of MIME /
//! webhook bodies by the edge) into the core's tagged `IngressMessage`.
//! Adapters do no I/O and make no routing decisions; the full original
//! payload rides along in the `raw` envelope for context.

pub mod chat;
pub mod email;
pub mod sms;

pub use chat::ChatAdapter;
pub use email::EmailAdapter;
pub use sms::SmsAdapter;

use hermes_shared::{HermesError, HermesResult};

pub(crate) fn parse_json(payload: &[u8]) -> HermesResult<serde_json::Value> {
    serde_json::from_slice(payload)
        .map_err(|e| HermesError::Validation(format!("undecodable ingress payload: {e}")))
}
