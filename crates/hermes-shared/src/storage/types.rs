//! # Durable Record Types
//!
//! Rows of the four persistence tables. Thread mappings live in
//! [`crate::types::thread`]; the remaining records are defined here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messaging::service::QueueTriplet;
use crate::types::{TenantKey, ThreadId};

/// Worker-declared ownership state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipStatus {
    Active,
    Inactive,
}

/// Worker-written row declaring current handling of a tenant key
///
/// The core only reads these; workers are the sole writers apart from the
/// reaper flipping stale records to inactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRecord {
    #[serde(rename = "tenantKey")]
    pub tenant: TenantKey,
    pub worker_id: String,
    pub status: OwnershipStatus,
    pub last_heartbeat_at: DateTime<Utc>,
}

impl OwnershipRecord {
    /// Freshness rule: owning iff active and heartbeat within the window
    pub fn is_owning(&self, now: DateTime<Utc>, freshness: chrono::Duration) -> bool {
        self.status == OwnershipStatus::Active && now - self.last_heartbeat_at <= freshness
    }
}

/// Registry row for a tenant's queue triplet
///
/// Keyed `(tenantKey, createdAt)` so historical triplets stay auditable;
/// readers always take the newest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueTripletRecord {
    #[serde(rename = "tenantKey")]
    pub tenant: TenantKey,
    #[serde(flatten)]
    pub triplet: QueueTriplet,
    pub created_at: DateTime<Utc>,
}

/// Session index row (read-only to the core)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    #[serde(rename = "tenantKey")]
    pub tenant: TenantKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
    pub last_activity_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(status: OwnershipStatus, heartbeat_age: Duration) -> OwnershipRecord {
        OwnershipRecord {
            tenant: TenantKey::new("amelia", "scott").unwrap(),
            worker_id: "worker-1".to_string(),
            status,
            last_heartbeat_at: Utc::now() - heartbeat_age,
        }
    }

    #[test]
    fn test_fresh_active_record_is_owning() {
        let r = record(OwnershipStatus::Active, Duration::minutes(1));
        assert!(r.is_owning(Utc::now(), Duration::minutes(5)));
    }

    #[test]
    fn test_stale_active_record_is_not_owning() {
        let r = record(OwnershipStatus::Active, Duration::minutes(10));
        assert!(!r.is_owning(Utc::now(), Duration::minutes(5)));
    }

    #[test]
    fn test_inactive_record_is_not_owning() {
        let r = record(OwnershipStatus::Inactive, Duration::seconds(1));
        assert!(!r.is_owning(Utc::now(), Duration::minutes(5)));
    }

    #[test]
    fn test_ownership_status_wire_form() {
        let json = serde_json::to_value(OwnershipStatus::Active).unwrap();
        assert_eq!(json, "active");
    }
}
