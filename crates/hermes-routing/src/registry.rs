//! # Queue Registry
//!
//! Authoritative map from tenant key to its `{input, output, dlq}` queue
//! triplet. Creation is lazy and idempotent; the registry record in the
//! durable store is the source of truth, with discovery-by-name as the
//! recovery path when the record is missing.
//!
//! The triplet invariant: at every observation point either all three
//! queues exist or none do. A creation that fails mid-way rolls back by
//! deleting the queues this call created before surfacing the error.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use hermes_shared::messaging::service::{
    managed_tags, QueueTriplet, QueueUrl, RedrivePolicy,
};
use hermes_shared::messaging::{MessagingError, QueueClient, QueueRole};
use hermes_shared::storage::{QueueTripletRecord, StorageProvider};
use hermes_shared::types::TenantKey;
use hermes_shared::{HermesError, HermesResult};

/// Redrive budget before a work message lands on the DLQ
pub const MAX_RECEIVE_COUNT: u32 = 3;

/// Registry over the queue service and the durable registry table
#[derive(Debug, Clone)]
pub struct QueueRegistry {
    client: Arc<QueueClient>,
    storage: Arc<StorageProvider>,
}

impl QueueRegistry {
    pub fn new(client: Arc<QueueClient>, storage: Arc<StorageProvider>) -> Self {
        Self { client, storage }
    }

    /// Idempotently ensure the triplet for a tenant exists and return it
    pub async fn ensure(&self, tenant: &TenantKey) -> HermesResult<QueueTriplet> {
        // Fast path: the registry record
        if let Some(record) = self.storage.latest_triplet(tenant).await? {
            return Ok(record.triplet);
        }

        let names = self.triplet_names(tenant)?;

        // Recovery path: queues may exist without a record (crash between
        // creation and persist, or registry table rebuilt)
        let existing = [
            self.client.queue_url(&names[0]).await?,
            self.client.queue_url(&names[1]).await?,
            self.client.queue_url(&names[2]).await?,
        ];
        if let [Some(input), Some(output), Some(dlq)] = existing.clone() {
            let triplet = QueueTriplet {
                input_url: input,
                output_url: output,
                dlq_url: dlq,
            };
            info!(tenant = %tenant, "Recovered existing queue triplet by name");
            self.persist(tenant, &triplet).await?;
            return Ok(triplet);
        }

        // Creation path
        let triplet = self.create_triplet(tenant, &names, &existing).await?;
        self.persist(tenant, &triplet).await?;
        info!(
            tenant = %tenant,
            input = %triplet.input_url,
            "Created queue triplet"
        );
        Ok(triplet)
    }

    /// The registered triplet, if any (no creation)
    pub async fn get(&self, tenant: &TenantKey) -> HermesResult<Option<QueueTriplet>> {
        Ok(self
            .storage
            .latest_triplet(tenant)
            .await?
            .map(|record| record.triplet))
    }

    /// Decommission a tenant: delete its queues and registry rows
    pub async fn drop_tenant(&self, tenant: &TenantKey) -> HermesResult<()> {
        let triplet = match self.get(tenant).await? {
            Some(triplet) => Some(triplet),
            None => {
                // No record - fall back to discovery so orphans still clean up
                let names = self.triplet_names(tenant)?;
                match (
                    self.client.queue_url(&names[0]).await?,
                    self.client.queue_url(&names[1]).await?,
                    self.client.queue_url(&names[2]).await?,
                ) {
                    (Some(input), Some(output), Some(dlq)) => Some(QueueTriplet {
                        input_url: input,
                        output_url: output,
                        dlq_url: dlq,
                    }),
                    _ => None,
                }
            }
        };

        if let Some(triplet) = triplet {
            for url in [&triplet.input_url, &triplet.output_url, &triplet.dlq_url] {
                if let Err(e) = self.client.delete_queue(url).await {
                    warn!(queue = %url, error = %e, "Queue delete failed during decommission");
                }
            }
        }
        self.storage.remove_triplets(tenant).await?;
        Ok(())
    }

    fn triplet_names(&self, tenant: &TenantKey) -> HermesResult<[String; 3]> {
        let namer = self.client.namer();
        Ok([
            namer.tenant_queue(tenant, QueueRole::Input)?,
            namer.tenant_queue(tenant, QueueRole::Output)?,
            namer.tenant_queue(tenant, QueueRole::Dlq)?,
        ])
    }

    /// Create missing queues concurrently, configure redrive and tags, and
    /// roll back this call's creations on any failure
    async fn create_triplet(
        &self,
        tenant: &TenantKey,
        names: &[String; 3],
        existing: &[Option<QueueUrl>; 3],
    ) -> HermesResult<QueueTriplet> {
        let (input_res, output_res, dlq_res) = tokio::join!(
            self.client.create_queue(&names[0]),
            self.client.create_queue(&names[1]),
            self.client.create_queue(&names[2]),
        );

        let results = [input_res, output_res, dlq_res];
        if results.iter().any(Result::is_err) {
            self.rollback(names, existing, &results).await;
            let reason = results
                .into_iter()
                .find_map(Result::err)
                .map(|e| e.to_string())
                .unwrap_or_default();
            return Err(HermesError::Transient(format!(
                "queue triplet creation failed for {tenant}: {reason}"
            )));
        }
        let [input_url, output_url, dlq_url] =
            results.map(|r| r.expect("checked for errors above"));

        let configure = async {
            self.client
                .set_redrive_policy(
                    &input_url,
                    &RedrivePolicy {
                        dead_letter_url: dlq_url.clone(),
                        max_receive_count: MAX_RECEIVE_COUNT,
                    },
                )
                .await?;

            let tags = managed_tags(&tenant.project_id, &tenant.canonical());
            for url in [&input_url, &output_url, &dlq_url] {
                self.client.tag_queue(url, &tags).await?;
            }
            Ok::<(), MessagingError>(())
        };

        if let Err(e) = configure.await {
            let created = [
                Ok(input_url.clone()),
                Ok(output_url.clone()),
                Ok(dlq_url.clone()),
            ];
            self.rollback(names, existing, &created).await;
            return Err(HermesError::Transient(format!(
                "queue triplet configuration failed for {tenant}: {e}"
            )));
        }

        Ok(QueueTriplet {
            input_url,
            output_url,
            dlq_url,
        })
    }

    /// Delete queues this ensure call created (never pre-existing ones)
    async fn rollback(
        &self,
        names: &[String; 3],
        existing: &[Option<QueueUrl>; 3],
        results: &[Result<QueueUrl, MessagingError>; 3],
    ) {
        for (idx, result) in results.iter().enumerate() {
            let pre_existing = existing[idx].is_some();
            if pre_existing {
                continue;
            }
            if let Ok(url) = result {
                match self.client.delete_queue(url).await {
                    Ok(()) => warn!(queue = %names[idx], "Rolled back partially created queue"),
                    Err(e) => warn!(
                        queue = %names[idx],
                        error = %e,
                        "Rollback delete failed; orphan will be reaped"
                    ),
                }
            }
        }
    }

    async fn persist(&self, tenant: &TenantKey, triplet: &QueueTriplet) -> HermesResult<()> {
        self.storage
            .put_triplet(&QueueTripletRecord {
                tenant: tenant.clone(),
                triplet: triplet.clone(),
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_shared::messaging::service::QueueProvider;
    use hermes_shared::messaging::QueueNamerKind;

    fn tenant() -> TenantKey {
        TenantKey::new("amelia", "scott").unwrap()
    }

    fn registry() -> (QueueRegistry, Arc<QueueClient>, Arc<StorageProvider>) {
        let client = Arc::new(QueueClient::new(
            Arc::new(QueueProvider::new_in_memory()),
            QueueNamerKind::default(),
        ));
        let storage = Arc::new(StorageProvider::new_memory());
        (
            QueueRegistry::new(client.clone(), storage.clone()),
            client,
            storage,
        )
    }

    #[tokio::test]
    async fn test_ensure_creates_all_three() {
        let (registry, client, _) = registry();
        let triplet = registry.ensure(&tenant()).await.unwrap();

        assert_eq!(
            triplet.input_url.queue_name(),
            "webordinary-input-amelia-scott"
        );
        for name in [
            "webordinary-input-amelia-scott",
            "webordinary-output-amelia-scott",
            "webordinary-dlq-amelia-scott",
        ] {
            assert!(client.queue_url(name).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let (registry, _, storage) = registry();
        let first = registry.ensure(&tenant()).await.unwrap();
        let second = registry.ensure(&tenant()).await.unwrap();
        assert_eq!(first, second);

        // Exactly one registry record
        let record = storage.latest_triplet(&tenant()).await.unwrap().unwrap();
        assert_eq!(record.triplet, first);
    }

    #[tokio::test]
    async fn test_ensure_tags_and_redrive() {
        let (registry, client, _) = registry();
        registry.ensure(&tenant()).await.unwrap();

        let infos = client.list_managed_queues().await.unwrap();
        assert_eq!(infos.len(), 3);
        for info in infos {
            assert_eq!(
                info.tags.get("tenant").map(String::as_str),
                Some("amelia#scott")
            );
            assert_eq!(info.tags.get("managedBy").map(String::as_str), Some("hermes"));
        }
    }

    #[tokio::test]
    async fn test_ensure_recovers_record_from_existing_queues() {
        let (registry, client, storage) = registry();
        // Queues exist but the registry record is gone
        registry.ensure(&tenant()).await.unwrap();
        storage.remove_triplets(&tenant()).await.unwrap();

        let triplet = registry.ensure(&tenant()).await.unwrap();
        assert_eq!(
            triplet.output_url.queue_name(),
            "webordinary-output-amelia-scott"
        );
        assert!(storage.latest_triplet(&tenant()).await.unwrap().is_some());
        // No duplicate queues
        assert_eq!(client.list_managed_queues().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_get_without_ensure() {
        let (registry, _, _) = registry();
        assert!(registry.get(&tenant()).await.unwrap().is_none());
        registry.ensure(&tenant()).await.unwrap();
        assert!(registry.get(&tenant()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_drop_tenant_removes_everything() {
        let (registry, client, storage) = registry();
        registry.ensure(&tenant()).await.unwrap();

        registry.drop_tenant(&tenant()).await.unwrap();

        assert!(client.list_managed_queues().await.unwrap().is_empty());
        assert!(storage.latest_triplet(&tenant()).await.unwrap().is_none());
    }
}
