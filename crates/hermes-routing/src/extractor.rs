//! # Thread Extractor
//!
//! Canonical thread identifier per ingress transport. Pure function of the
//! ingress payload - no I/O, never fails. Replays of the same continuity
//! token always land on the same thread.
//!
//! Rules per transport:
//! - **Email**: first `References` entry, else `In-Reply-To`, else the
//!   current `Message-ID`, angle brackets stripped, then hashed.
//! - **SMS**: provider conversation id when present, else the canonicalized
//!   pair `min(from,to) + ":" + max(from,to)` so either direction yields
//!   the same thread.
//! - **Chat**: transport thread id when present, else the provider message
//!   id.
//! - **Fallback**: synthesized identifier when no token exists at all.

use hermes_shared::types::{IngressMessage, IngressPayload, ThreadId};

use crate::hashing::{short_hash, synthetic_thread_id};

/// Stateless extractor; construct once and share freely
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadExtractor;

impl ThreadExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Derive the thread identifier for an ingress message
    pub fn extract(&self, ingress: &IngressMessage) -> ThreadId {
        // An upstream hop may already have hashed the token
        if let Some(hint) = ingress
            .thread_id_hint
            .as_deref()
            .filter(|h| !h.is_empty())
        {
            return ThreadId::new(hint);
        }

        let token = match &ingress.payload {
            IngressPayload::Email(email) => email
                .references
                .first()
                .map(String::as_str)
                .or(email.in_reply_to.as_deref())
                .unwrap_or(email.message_id.as_str())
                .trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string(),
            IngressPayload::Sms(sms) => match sms.conversation_id.as_deref() {
                Some(conversation) if !conversation.is_empty() => conversation.to_string(),
                _ => {
                    let (low, high) = if sms.from <= sms.to {
                        (&sms.from, &sms.to)
                    } else {
                        (&sms.to, &sms.from)
                    };
                    format!("{low}:{high}")
                }
            },
            IngressPayload::Chat(chat) => chat
                .thread_id
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| chat.message_id.clone()),
        };

        if token.is_empty() {
            return ThreadId::new(synthetic_thread_id());
        }
        ThreadId::new(short_hash(&token))
    }
}
