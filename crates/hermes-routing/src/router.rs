//! # Router
//!
//! Orchestrates the routing pipeline: thread extraction, tenant resolution,
//! message construction, validation, queue allocation, the ordered work
//! send (through the correlator), the ownership check, and the claim
//! announcement.
//!
//! Validation runs before any queue side effect - including triplet
//! creation - so a rejected message leaves no trace. Work send and claim
//! announcement are independently attempted: a claim failure never
//! suppresses a delivered work message, and a work failure surfaces as a
//! transient error so the ingress layer redelivers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use hermes_shared::messaging::service::QueueUrl;
use hermes_shared::messaging::{ClaimRequest, QueueClient, WorkMessage};
use hermes_shared::storage::StorageProvider;
use hermes_shared::types::{IngressMessage, IngressPayload, TenantKey, ThreadId, ThreadMapping};
use hermes_shared::{HermesError, HermesResult};

use crate::correlator::{Correlator, ResponseFuture};
use crate::extractor::ThreadExtractor;
use crate::ownership::OwnershipChecker;
use crate::registry::QueueRegistry;
use crate::resolver::TenantResolver;
use crate::validation::validate_work_message;

/// Backoff before the single claim-send retry
const CLAIM_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// What a route decided
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub tenant: TenantKey,
    pub input_url: QueueUrl,
    pub output_url: QueueUrl,
    /// True when no fresh active worker owned the tenant at routing time
    pub needs_unclaimed: bool,
}

/// Decision plus the correlation future for the enqueued command
#[derive(Debug)]
pub struct RouteOutcome {
    pub decision: RoutingDecision,
    pub command_id: Uuid,
    pub thread_id: ThreadId,
    pub response: ResponseFuture,
}

/// The routing pipeline
#[derive(Debug)]
pub struct Router {
    extractor: ThreadExtractor,
    resolver: TenantResolver,
    registry: QueueRegistry,
    ownership: OwnershipChecker,
    correlator: Arc<Correlator>,
    client: Arc<QueueClient>,
    storage: Arc<StorageProvider>,
    unclaimed_url: OnceCell<QueueUrl>,
}

impl Router {
    pub fn new(
        resolver: TenantResolver,
        registry: QueueRegistry,
        ownership: OwnershipChecker,
        correlator: Arc<Correlator>,
        client: Arc<QueueClient>,
        storage: Arc<StorageProvider>,
    ) -> Self {
        Self {
            extractor: ThreadExtractor::new(),
            resolver,
            registry,
            ownership,
            correlator,
            client,
            storage,
            unclaimed_url: OnceCell::new(),
        }
    }

    /// Route an ingress message with a fresh command id and default timeout
    pub async fn route(&self, ingress: &IngressMessage) -> HermesResult<RouteOutcome> {
        self.route_with(ingress, None, None).await
    }

    /// Route with a caller-supplied command id and/or correlation timeout
    #[instrument(skip(self, ingress), fields(source = %ingress.transport()))]
    pub async fn route_with(
        &self,
        ingress: &IngressMessage,
        command_id: Option<Uuid>,
        timeout: Option<Duration>,
    ) -> HermesResult<RouteOutcome> {
        // 1-2. Thread identity, then tenant
        let thread_id = self.extractor.extract(ingress);
        let resolved = self.resolver.resolve(ingress, &thread_id).await?;

        // 3-4. Build the canonical work message
        let work = self.build_work_message(ingress, &thread_id, command_id, &resolved)?;

        // 5. Validation gate: a failure is permanent and leaves no queue
        //    side effect, so it runs before triplet allocation too
        validate_work_message(&work)?;

        // Queue allocation
        let triplet = self.registry.ensure(&resolved.tenant).await?;

        // Thread bookkeeping: first message binds the tenant, follow-ups
        // only touch activity (the binding is immutable)
        self.record_thread(&thread_id, &work).await;

        // 6. Ordered work send + pending registration
        let work_result = self
            .correlator
            .submit(&work, &triplet, timeout)
            .await;

        // 7-8. Ownership check, then best-effort claim announcement. Both
        // sides run even when the other fails.
        let owned = self.ownership.is_owning(&resolved.tenant).await;
        let mut claim_error = None;
        if !owned {
            if let Err(e) = self
                .announce_claim(&resolved.tenant, work.command_id, work.source)
                .await
            {
                claim_error = Some(e);
            }
        }

        let response = match work_result {
            Ok(response) => response,
            Err(work_error) => {
                if let Some(claim_error) = claim_error {
                    return Err(HermesError::Transient(format!(
                        "route failed for {}: work send ({work_error}) and claim announcement \
                         ({claim_error}) both failed",
                        resolved.tenant
                    )));
                }
                return Err(work_error);
            }
        };

        if let Some(claim_error) = claim_error {
            // The work message is on the queue; an owned-looking worker or
            // the next route will re-announce
            warn!(
                tenant = %resolved.tenant,
                error = %claim_error,
                "Claim announcement failed; work message already delivered"
            );
        }

        info!(
            tenant = %resolved.tenant,
            command_id = %work.command_id,
            thread_id = %thread_id,
            needs_unclaimed = !owned,
            "Routed work message"
        );

        Ok(RouteOutcome {
            decision: RoutingDecision {
                tenant: resolved.tenant,
                input_url: triplet.input_url,
                output_url: triplet.output_url,
                needs_unclaimed: !owned,
            },
            command_id: work.command_id,
            thread_id,
            response,
        })
    }

    fn build_work_message(
        &self,
        ingress: &IngressMessage,
        thread_id: &ThreadId,
        command_id: Option<Uuid>,
        resolved: &crate::resolver::ResolvedTenant,
    ) -> HermesResult<WorkMessage> {
        let session_id = ingress
            .session_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("sess-{}", Uuid::now_v7()));

        let user_email = match &ingress.payload {
            IngressPayload::Email(email) => Some(email.from.clone()),
            _ => None,
        };

        Ok(WorkMessage {
            command_id: command_id.unwrap_or_else(Uuid::new_v4),
            session_id,
            tenant: resolved.tenant.clone(),
            thread_id: thread_id.clone(),
            instruction: ingress.instruction().to_string(),
            repo_url: resolved.repo_url.clone(),
            user_email,
            source: ingress.transport(),
            timestamp: Utc::now(),
            context: ingress.raw.clone(),
        })
    }

    /// Insert or touch the thread mapping. Failures are logged, not fatal:
    /// the conditional insert preserves tenant permanence either way.
    async fn record_thread(&self, thread_id: &ThreadId, work: &WorkMessage) {
        let mapping = ThreadMapping::new(thread_id.clone(), work.tenant.clone(), work.source);
        match self.storage.insert_mapping_if_absent(&mapping).await {
            Ok(true) => {
                debug!(thread_id = %thread_id, tenant = %work.tenant, "Thread mapping created");
            }
            Ok(false) => {
                if let Err(e) = self
                    .storage
                    .touch_mapping(thread_id, work.source, Utc::now())
                    .await
                {
                    warn!(thread_id = %thread_id, error = %e, "Thread mapping touch failed");
                }
            }
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "Thread mapping insert failed");
            }
        }
    }

    /// Publish a claim request on the unclaimed queue, retrying once
    async fn announce_claim(
        &self,
        tenant: &TenantKey,
        command_id: Uuid,
        source: hermes_shared::types::Transport,
    ) -> HermesResult<()> {
        let unclaimed = self
            .unclaimed_url
            .get_or_try_init(|| async { self.client.ensure_unclaimed_queue().await })
            .await
            .map_err(|e| HermesError::Transient(format!("unclaimed queue unavailable: {e}")))?;

        let claim = ClaimRequest {
            tenant: tenant.clone(),
            command_id,
            timestamp: Utc::now(),
        };

        let first = self.client.send_claim(unclaimed, &claim, source).await;
        if let Err(first_err) = first {
            debug!(tenant = %tenant, error = %first_err, "Claim send failed; retrying once");
            tokio::time::sleep(CLAIM_RETRY_BACKOFF).await;
            self.client
                .send_claim(unclaimed, &claim, source)
                .await
                .map_err(|e| HermesError::Transient(format!("claim send failed: {e}")))?;
        }
        debug!(tenant = %tenant, command_id = %command_id, "Claim request announced");
        Ok(())
    }
}
