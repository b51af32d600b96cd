//! # Lifecycle Reaper
//!
//! Scheduled cleanup of orphaned queues, stale ownership records, and
//! expired thread mappings. Runs every six hours by default; each tick is
//! independent and idempotent.
//!
//! Orphan rule: a tenant's queues are deleted when the tenant has no
//! ownership record with `status = active` and every queue in the triplet
//! is older than the orphan window. Messages still on a queue at deletion
//! time are counted and logged; archival is out of scope. The registry
//! record is removed in the same pass so a later `ensure` recreates a
//! consistent triplet.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hermes_shared::config::ReaperConfig;
use hermes_shared::messaging::service::QueueInfo;
use hermes_shared::messaging::QueueClient;
use hermes_shared::storage::{OwnershipStatus, StorageProvider};
use hermes_shared::types::TenantKey;
use hermes_shared::HermesResult;

use crate::ownership::OwnershipChecker;

/// Counts from one reaper tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub orphaned_queues_deleted: usize,
    pub stranded_messages: u64,
    pub stale_ownerships_flipped: usize,
    pub expired_thread_mappings: usize,
}

/// The scheduled cleanup task
#[derive(Debug)]
pub struct Reaper {
    client: Arc<QueueClient>,
    storage: Arc<StorageProvider>,
    ownership: OwnershipChecker,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(
        client: Arc<QueueClient>,
        storage: Arc<StorageProvider>,
        ownership: OwnershipChecker,
        config: ReaperConfig,
    ) -> Self {
        Self {
            client,
            storage,
            ownership,
            config,
        }
    }

    /// Run on the configured schedule until the token cancels
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut tick = tokio::time::interval(self.config.interval());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; skip it so startup
        // does not race queue creation
        tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    match self.run_once().await {
                        Ok(report) => info!(
                            orphaned_queues = report.orphaned_queues_deleted,
                            stranded_messages = report.stranded_messages,
                            stale_ownerships = report.stale_ownerships_flipped,
                            expired_threads = report.expired_thread_mappings,
                            "Reaper tick complete"
                        ),
                        Err(e) => warn!(error = %e, "Reaper tick failed"),
                    }
                }
            }
        }
        info!("Reaper stopped");
    }

    /// One full cleanup pass
    pub async fn run_once(&self) -> HermesResult<ReapReport> {
        let mut report = ReapReport::default();

        self.reap_orphaned_queues(&mut report).await?;
        report.stale_ownerships_flipped = self.ownership.sweep_stale().await?;
        report.expired_thread_mappings = self.storage.sweep_expired_mappings(Utc::now()).await?;

        Ok(report)
    }

    async fn reap_orphaned_queues(&self, report: &mut ReapReport) -> HermesResult<()> {
        let now = Utc::now();
        let orphan_age = self.config.orphan_age();
        let namer = self.client.namer().clone();

        // Group managed queues by the tenant their name encodes; foreign
        // names and the unclaimed queue parse to None and are skipped
        let mut by_tenant: HashMap<String, (TenantKey, Vec<QueueInfo>)> = HashMap::new();
        for info in self.client.list_managed_queues().await? {
            if let Some((_, tenant)) = namer.parse_queue_name(&info.name) {
                by_tenant
                    .entry(tenant.canonical())
                    .or_insert_with(|| (tenant, Vec::new()))
                    .1
                    .push(info);
            }
        }

        for (_, (tenant, queues)) in by_tenant {
            let actively_owned = matches!(
                self.storage.ownership(&tenant).await,
                Ok(Some(record)) if record.status == OwnershipStatus::Active
            );
            if actively_owned {
                continue;
            }

            let all_old = queues.iter().all(|q| now - q.created_at > orphan_age);
            if !all_old {
                continue;
            }

            for queue in &queues {
                let stranded = match self.client.queue_stats(&queue.url).await {
                    Ok(stats) => stats.message_count,
                    Err(e) => {
                        warn!(queue = %queue.name, error = %e, "Stats failed before deletion");
                        0
                    }
                };
                match self.client.delete_queue(&queue.url).await {
                    Ok(()) => {
                        if stranded > 0 {
                            warn!(
                                queue = %queue.name,
                                stranded,
                                "Deleted orphaned queue with messages still on it"
                            );
                        } else {
                            info!(queue = %queue.name, "Deleted orphaned queue");
                        }
                        report.orphaned_queues_deleted += 1;
                        report.stranded_messages += stranded;
                    }
                    Err(e) => warn!(queue = %queue.name, error = %e, "Orphan deletion failed"),
                }
            }

            if let Err(e) = self.storage.remove_triplets(&tenant).await {
                warn!(tenant = %tenant, error = %e, "Registry cleanup failed after orphan reap");
            }
        }
        Ok(())
    }
}
