//! # Thread Identifiers and Mappings
//!
//! A thread identifier is a short URL-safe handle stable across all
//! messages of one logical conversation. It carries no tenant information;
//! the tenant binding lives in the `ThreadMapping` table, where it is
//! immutable once written.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ingress::Transport;
use super::tenant::TenantKey;

/// Days of inactivity after which a thread mapping expires
pub const THREAD_TTL_DAYS: i64 = 30;

/// Opaque conversation handle, stable across transports
///
/// Hashed identifiers are exactly 8 URL-safe characters; synthesized
/// fallback identifiers (no continuity token on the wire) are longer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-thread record binding a conversation to its tenant
///
/// The `tenant` field is append-only per thread: once a threadId maps to a
/// tenant key, no subsequent message changes it. Activity fields are
/// mutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMapping {
    pub thread_id: ThreadId,
    pub tenant: TenantKey,
    pub first_seen_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub message_count: u64,
    pub last_transport: Transport,
    /// Absolute expiry; refreshed on every activity touch
    pub expires_at: DateTime<Utc>,
}

impl ThreadMapping {
    /// Create a fresh mapping for a first-seen thread
    pub fn new(thread_id: ThreadId, tenant: TenantKey, transport: Transport) -> Self {
        let now = Utc::now();
        Self {
            thread_id,
            tenant,
            first_seen_at: now,
            last_activity_at: now,
            message_count: 1,
            last_transport: transport,
            expires_at: now + Duration::days(THREAD_TTL_DAYS),
        }
    }

    /// Record a follow-up message on this thread
    pub fn touch(&mut self, transport: Transport, now: DateTime<Utc>) {
        self.last_activity_at = now;
        self.message_count += 1;
        self.last_transport = transport;
        self.expires_at = now + Duration::days(THREAD_TTL_DAYS);
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> ThreadMapping {
        ThreadMapping::new(
            ThreadId::new("aBcD1234"),
            TenantKey::new("amelia", "scott").unwrap(),
            Transport::Email,
        )
    }

    #[test]
    fn test_new_mapping_counts_first_message() {
        let m = mapping();
        assert_eq!(m.message_count, 1);
        assert_eq!(m.first_seen_at, m.last_activity_at);
    }

    #[test]
    fn test_touch_updates_activity() {
        let mut m = mapping();
        let later = m.last_activity_at + Duration::minutes(10);
        m.touch(Transport::Sms, later);
        assert_eq!(m.message_count, 2);
        assert_eq!(m.last_activity_at, later);
        assert_eq!(m.last_transport, Transport::Sms);
        assert_eq!(m.expires_at, later + Duration::days(THREAD_TTL_DAYS));
    }

    #[test]
    fn test_expiry_window() {
        let m = mapping();
        assert!(!m.is_expired(m.last_activity_at + Duration::days(29)));
        assert!(m.is_expired(m.last_activity_at + Duration::days(31)));
    }

    #[test]
    fn test_thread_id_serde_transparent() {
        let id = ThreadId::new("aBcD1234");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"aBcD1234\"");
    }
}
