//! # Ownership Checker
//!
//! Read-side view of the worker-written ownership table. A tenant is owned
//! iff an active record exists with a heartbeat inside the freshness
//! window; everything else - missing record, inactive status, stale
//! heartbeat, or an unreachable store - reads as not owned. Failing open
//! prefers announcing on the unclaimed queue over blocking work.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use hermes_shared::config::OwnershipConfig;
use hermes_shared::storage::{OwnershipStatus, StorageProvider};
use hermes_shared::types::TenantKey;
use hermes_shared::HermesResult;

/// Freshness-aware reader over the ownership store
#[derive(Debug, Clone)]
pub struct OwnershipChecker {
    storage: Arc<StorageProvider>,
    config: OwnershipConfig,
}

impl OwnershipChecker {
    pub fn new(storage: Arc<StorageProvider>, config: OwnershipConfig) -> Self {
        Self { storage, config }
    }

    /// Whether a fresh active worker currently owns the tenant.
    ///
    /// Store failures return `false` (fail-open for the claim side).
    pub async fn is_owning(&self, tenant: &TenantKey) -> bool {
        match self.storage.ownership(tenant).await {
            Ok(Some(record)) => record.is_owning(Utc::now(), self.config.freshness()),
            Ok(None) => false,
            Err(e) => {
                warn!(
                    tenant = %tenant,
                    error = %e,
                    "Ownership lookup failed; treating tenant as unowned"
                );
                false
            }
        }
    }

    /// Flip active records whose heartbeat exceeds the hard-stale window to
    /// inactive. Returns how many records were flipped.
    pub async fn sweep_stale(&self) -> HermesResult<usize> {
        let now = Utc::now();
        let hard_stale = self.config.hard_stale();
        let mut flipped = 0;

        for record in self.storage.active_ownerships().await? {
            if now - record.last_heartbeat_at > hard_stale {
                if self
                    .storage
                    .set_ownership_status(&record.tenant, OwnershipStatus::Inactive)
                    .await?
                {
                    info!(
                        tenant = %record.tenant,
                        worker_id = %record.worker_id,
                        heartbeat_age_secs = (now - record.last_heartbeat_at).num_seconds(),
                        "Flipped stale ownership record to inactive"
                    );
                    flipped += 1;
                }
            }
        }
        Ok(flipped)
    }
}
