//! # Request/Response Correlator
//!
//! Matches worker responses on tenant output queues to outstanding command
//! futures, with timeout, cancellation, and interrupt semantics.
//!
//! ## Correlation protocol
//!
//! One long-poll loop per tenant with pending entries (wait 5 s, batch up
//! to 10). Known command ids delete the queue message *first*, then resolve
//! the pending entry: resolve-before-delete risks at-least-once becoming
//! at-least-twice under crash, while delete-first accepts the rare dropped
//! response, which the timeout covers. Unknown command ids are acknowledged
//! and discarded - they belong to futures that already timed out, and
//! leaving them would cause perpetual redelivery.
//!
//! ## Interrupts
//!
//! Submitting new work for a tenant with pending entries resolves every
//! older entry with `interrupted = true` before the new work message is
//! placed on the input queue, and enqueues a high-priority `interrupt`
//! payload ahead of it through the same ordered channel.
//!
//! ## Derived state
//!
//! The pending map is in-memory only and intentionally lost on restart;
//! timeouts surface the dropped futures and stranded responses are
//! discarded as unknown.

pub mod pending;
mod senders;

pub use pending::{CommandOutcome, CorrelationError, ResponseFuture};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hermes_shared::config::CorrelationConfig;
use hermes_shared::messaging::service::{QueueTriplet, QueueUrl, QueuedMessage};
use hermes_shared::messaging::{
    InterruptMessage, QueueClient, QueuePayload, ResponseMessage, WorkMessage,
};
use hermes_shared::types::TenantKey;
use hermes_shared::{HermesError, HermesResult};

use pending::PendingEntry;
use senders::TenantSenders;

/// Backoff after a failed poll against an output queue
const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Idle deadline ticks before a tenant loop parks itself
const IDLE_EXIT_TICKS: u32 = 15;

/// The correlation engine. Cheap to clone via `Arc`; one per process.
#[derive(Debug)]
pub struct Correlator {
    client: Arc<QueueClient>,
    config: CorrelationConfig,
    pending: DashMap<Uuid, PendingEntry>,
    tenant_loops: DashMap<String, ()>,
    senders: TenantSenders,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Correlator {
    pub fn new(client: Arc<QueueClient>, config: CorrelationConfig) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        Arc::new(Self {
            senders: TenantSenders::new(client.clone(), shutdown.clone()),
            client,
            config,
            pending: DashMap::new(),
            tenant_loops: DashMap::new(),
            tracker: TaskTracker::new(),
            shutdown,
        })
    }

    /// Number of outstanding commands (all tenants)
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Submit new work: resolve older pendings as interrupted, enqueue the
    /// interrupt signal and the work message in order, register the pending
    /// entry, and return its future.
    pub async fn submit(
        self: &Arc<Self>,
        work: &WorkMessage,
        triplet: &QueueTriplet,
        timeout: Option<Duration>,
    ) -> HermesResult<ResponseFuture> {
        let older = self.take_pending_for_tenant(&work.tenant);
        if !older.is_empty() {
            info!(
                tenant = %work.tenant,
                interrupted = older.len(),
                new_command = %work.command_id,
                "New work preempts pending commands"
            );
            for entry in older {
                let response = ResponseMessage::interrupted(
                    entry.command_id,
                    entry.session_id.clone(),
                    Some(work.command_id),
                    "new command received",
                );
                entry.resolve(Ok(response));
            }
            // The interrupt signal goes through the same ordered channel as
            // the work message, so the worker sees it first
            self.senders
                .send_interrupt(
                    &work.tenant,
                    &triplet.input_url,
                    InterruptMessage {
                        tenant: work.tenant.clone(),
                        interrupted_by: work.command_id,
                        reason: "new command received".to_string(),
                        timestamp: Utc::now(),
                    },
                    work.source,
                )
                .await?;
        }

        let future = self.register(work, triplet, timeout)?;

        if let Err(e) = self
            .senders
            .send_work(&work.tenant, &triplet.input_url, work)
            .await
        {
            // The future was never handed out; drop the entry silently
            self.pending.remove(&work.command_id);
            return Err(e);
        }
        Ok(future)
    }

    /// Register a pending entry for work the router already enqueued
    pub fn register(
        self: &Arc<Self>,
        work: &WorkMessage,
        triplet: &QueueTriplet,
        timeout: Option<Duration>,
    ) -> HermesResult<ResponseFuture> {
        let timeout = timeout.unwrap_or_else(|| self.config.default_timeout());
        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry {
            command_id: work.command_id,
            tenant: work.tenant.clone(),
            thread_id: work.thread_id.clone(),
            session_id: work.session_id.clone(),
            source: work.source,
            input_url: triplet.input_url.clone(),
            output_url: triplet.output_url.clone(),
            submitted_at: Instant::now(),
            deadline: Instant::now() + timeout,
            completer: tx,
        };

        // Duplicate command ids violate the at-most-one-resolution invariant
        match self.pending.entry(work.command_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(HermesError::Fatal(format!(
                    "duplicate pending commandId {}",
                    work.command_id
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }

        self.ensure_tenant_loop(&work.tenant, &triplet.output_url);
        Ok(ResponseFuture::new(work.command_id, rx))
    }

    /// Resolve every pending entry for a tenant with a synthetic
    /// interrupted response. Idempotent; also nudges the worker with a
    /// high-priority interrupt payload when anything was pending.
    pub async fn interrupt(&self, tenant: &TenantKey, reason: &str) {
        let entries = self.take_pending_for_tenant(tenant);
        if entries.is_empty() {
            return;
        }
        info!(
            tenant = %tenant,
            interrupted = entries.len(),
            reason,
            "Interrupting pending commands"
        );

        let input_url = entries[0].input_url.clone();
        let source = entries[0].source;
        for entry in entries {
            let response = ResponseMessage::interrupted(
                entry.command_id,
                entry.session_id.clone(),
                None,
                reason,
            );
            entry.resolve(Ok(response));
        }

        let interrupt = InterruptMessage {
            tenant: tenant.clone(),
            interrupted_by: Uuid::nil(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self
            .senders
            .send_interrupt(tenant, &input_url, interrupt, source)
            .await
        {
            warn!(tenant = %tenant, error = %e, "Interrupt signal enqueue failed");
        }
    }

    /// Cancel one pending command. Safe to race with an arriving response:
    /// whoever removes the entry resolves the future, the loser no-ops.
    pub fn cancel(&self, command_id: Uuid) {
        if let Some((_, entry)) = self.pending.remove(&command_id) {
            debug!(command_id = %command_id, "Cancelling pending command");
            entry.resolve(Err(CorrelationError::Cancelled { command_id }));
        }
    }

    /// Resolve all pendings as cancelled, stop every tenant loop, and wait
    /// for each to acknowledge the stop signal.
    pub async fn shutdown(&self) {
        info!(pending = self.pending.len(), "Correlator shutting down");
        self.shutdown.cancel();

        let ids: Vec<Uuid> = self.pending.iter().map(|e| *e.key()).collect();
        for command_id in ids {
            if let Some((_, entry)) = self.pending.remove(&command_id) {
                entry.resolve(Err(CorrelationError::Cancelled { command_id }));
            }
        }

        self.senders.shutdown().await;
        self.tracker.close();
        self.tracker.wait().await;
        info!("Correlator stopped");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn take_pending_for_tenant(&self, tenant: &TenantKey) -> Vec<PendingEntry> {
        let ids: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|e| &e.tenant == tenant)
            .map(|e| *e.key())
            .collect();
        ids.into_iter()
            .filter_map(|id| self.pending.remove(&id).map(|(_, entry)| entry))
            .collect()
    }

    fn has_pending_for(&self, canonical: &str) -> bool {
        self.pending
            .iter()
            .any(|e| e.tenant.canonical() == canonical)
    }

    fn ensure_tenant_loop(self: &Arc<Self>, tenant: &TenantKey, output_url: &QueueUrl) {
        let canonical = tenant.canonical();
        if self.tenant_loops.contains_key(&canonical) {
            return;
        }
        let slot = self.tenant_loops.entry(canonical.clone());
        if let dashmap::mapref::entry::Entry::Vacant(slot) = slot {
            slot.insert(());
            let this = self.clone();
            let output_url = output_url.clone();
            self.tracker.spawn(async move {
                this.tenant_loop(canonical, output_url).await;
            });
        }
    }

    /// Poll loop for one tenant's output queue
    async fn tenant_loop(self: Arc<Self>, canonical: String, output_url: QueueUrl) {
        debug!(tenant = %canonical, "Tenant poll loop started");
        let mut tick = tokio::time::interval(self.config.deadline_tick());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut idle_ticks: u32 = 0;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                _ = tick.tick() => {
                    self.expire_deadlines();
                    if self.has_pending_for(&canonical) {
                        idle_ticks = 0;
                    } else {
                        idle_ticks += 1;
                        if idle_ticks >= IDLE_EXIT_TICKS {
                            self.tenant_loops.remove(&canonical);
                            // A submit may have raced our removal; it would
                            // have seen the loop present and not respawned
                            if self.has_pending_for(&canonical) {
                                if let Some(entry) = self
                                    .pending
                                    .iter()
                                    .find(|e| e.tenant.canonical() == canonical)
                                {
                                    let tenant = entry.tenant.clone();
                                    let url = entry.output_url.clone();
                                    drop(entry);
                                    self.ensure_tenant_loop(&tenant, &url);
                                }
                            }
                            break;
                        }
                    }
                }

                result = self.client.receive_responses(
                    &output_url,
                    self.config.batch_size,
                    self.config.poll_wait(),
                ) => {
                    match result {
                        Ok(messages) => {
                            for message in messages {
                                self.handle_output_message(&output_url, message).await;
                            }
                        }
                        Err(e) => {
                            // Never resolves pendings; the queue may recover
                            warn!(
                                tenant = %canonical,
                                error = %e,
                                "Output queue poll failed; backing off"
                            );
                            tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }
        debug!(tenant = %canonical, "Tenant poll loop acknowledged stop");
    }

    async fn handle_output_message(&self, output_url: &QueueUrl, message: QueuedMessage) {
        let response = match message.parse_payload() {
            Ok(QueuePayload::Response(response)) => response,
            Ok(other) => {
                warn!(
                    queue = %output_url,
                    kind = other.kind(),
                    "Non-response payload on output queue; discarding"
                );
                self.ack_quietly(output_url, &message).await;
                return;
            }
            Err(e) => {
                warn!(queue = %output_url, error = %e, "Unparseable output payload; discarding");
                self.ack_quietly(output_url, &message).await;
                return;
            }
        };

        if !self.pending.contains_key(&response.command_id) {
            // Likely a response whose future already timed out
            debug!(
                command_id = %response.command_id,
                "Unknown commandId on output queue; acknowledged and discarded"
            );
            self.ack_quietly(output_url, &message).await;
            return;
        }

        // Delete first, then resolve (see module docs)
        if let Err(e) = self
            .client
            .ack_message(output_url, &message.receipt_handle)
            .await
        {
            warn!(
                command_id = %response.command_id,
                error = %e,
                "Failed to delete response message; leaving for redelivery"
            );
            return;
        }

        if let Some((_, entry)) = self.pending.remove(&response.command_id) {
            debug!(
                command_id = %response.command_id,
                success = response.success,
                "Response correlated"
            );
            entry.resolve(Ok(response));
        }
        // else: cancel won the race; the delete already happened, no-op
    }

    async fn ack_quietly(&self, url: &QueueUrl, message: &QueuedMessage) {
        if let Err(e) = self.client.ack_message(url, &message.receipt_handle).await {
            warn!(queue = %url, error = %e, "Ack of discarded message failed");
        }
    }

    fn expire_deadlines(&self) {
        let now = Instant::now();
        let expired: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|e| e.deadline <= now)
            .map(|e| *e.key())
            .collect();

        for command_id in expired {
            if let Some((_, entry)) = self.pending.remove(&command_id) {
                warn!(
                    command_id = %command_id,
                    tenant = %entry.tenant,
                    "Pending command timed out"
                );
                let after_secs = (entry.deadline - entry.submitted_at).as_secs();
                entry.resolve(Err(CorrelationError::TimedOut {
                    command_id,
                    after_secs,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_shared::messaging::service::QueueProvider;
    use hermes_shared::messaging::QueueNamerKind;
    use hermes_shared::types::{ThreadId, Transport};

    fn tenant() -> TenantKey {
        TenantKey::new("amelia", "scott").unwrap()
    }

    fn work() -> WorkMessage {
        WorkMessage {
            command_id: Uuid::new_v4(),
            session_id: "sess-1".to_string(),
            tenant: tenant(),
            thread_id: ThreadId::new("aBcD1234"),
            instruction: "update homepage".to_string(),
            repo_url: Some("https://github.com/amelia/site.git".to_string()),
            user_email: None,
            source: Transport::Email,
            timestamp: Utc::now(),
            context: serde_json::Value::Null,
        }
    }

    fn response_for(command_id: Uuid) -> ResponseMessage {
        ResponseMessage {
            command_id,
            session_id: "sess-1".to_string(),
            success: true,
            summary: Some("done".to_string()),
            files_changed: None,
            error: None,
            interrupted: false,
            interrupted_by: None,
            completed_at: Utc::now(),
        }
    }

    fn fast_config() -> CorrelationConfig {
        CorrelationConfig {
            default_timeout_secs: 300,
            poll_wait_secs: 1,
            batch_size: 10,
            deadline_tick_secs: 1,
        }
    }

    async fn harness() -> (Arc<Correlator>, Arc<QueueClient>, QueueTriplet) {
        let client = Arc::new(QueueClient::new(
            Arc::new(QueueProvider::new_in_memory()),
            QueueNamerKind::default(),
        ));
        let input = client
            .create_queue("webordinary-input-amelia-scott")
            .await
            .unwrap();
        let output = client
            .create_queue("webordinary-output-amelia-scott")
            .await
            .unwrap();
        let dlq = client
            .create_queue("webordinary-dlq-amelia-scott")
            .await
            .unwrap();
        let correlator = Correlator::new(client.clone(), fast_config());
        (
            correlator,
            client,
            QueueTriplet {
                input_url: input,
                output_url: output,
                dlq_url: dlq,
            },
        )
    }

    /// Worker stand-in: post a response on the output queue
    async fn post_response(client: &QueueClient, triplet: &QueueTriplet, response: ResponseMessage) {
        use hermes_shared::messaging::{MessageAttributes, Priority};
        client
            .provider()
            .send_message(
                &triplet.output_url,
                &QueuePayload::Response(response),
                &MessageAttributes::new(&tenant(), Transport::Email, Priority::Normal),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_submit_places_work_and_resolves_on_response() {
        let (correlator, client, triplet) = harness().await;
        let msg = work();

        let future = correlator.submit(&msg, &triplet, None).await.unwrap();
        assert_eq!(correlator.pending_count(), 1);

        // Work landed on the input queue
        let input_msgs = client
            .receive_responses(&triplet.input_url, 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(input_msgs.len(), 1);

        post_response(&client, &triplet, response_for(msg.command_id)).await;

        let outcome = future.wait().await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.command_id, msg.command_id);
        assert_eq!(correlator.pending_count(), 0);
        correlator.shutdown().await;
    }

    #[tokio::test]
    async fn test_response_message_deleted_from_queue() {
        let (correlator, client, triplet) = harness().await;
        let msg = work();
        let future = correlator.submit(&msg, &triplet, None).await.unwrap();

        post_response(&client, &triplet, response_for(msg.command_id)).await;
        future.wait().await.unwrap();

        // Give the loop a beat, then check nothing lingers
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stats = client.queue_stats(&triplet.output_url).await.unwrap();
        assert_eq!(stats.message_count, 0);
        correlator.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_command_acknowledged_and_discarded() {
        let (correlator, client, triplet) = harness().await;
        // A pending entry so the loop runs
        let msg = work();
        let future = correlator.submit(&msg, &triplet, None).await.unwrap();

        // Stray response for a command nobody is waiting on
        post_response(&client, &triplet, response_for(Uuid::new_v4())).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        let stats = client.queue_stats(&triplet.output_url).await.unwrap();
        assert_eq!(stats.message_count, 0, "stray response should be deleted");
        assert_eq!(correlator.pending_count(), 1, "real pending untouched");

        correlator.cancel(msg.command_id);
        assert!(matches!(
            future.wait().await,
            Err(CorrelationError::Cancelled { .. })
        ));
        correlator.shutdown().await;
    }

    #[tokio::test]
    async fn test_timeout_resolves_future() {
        let (correlator, _, triplet) = harness().await;
        let msg = work();
        let future = correlator
            .submit(&msg, &triplet, Some(Duration::from_millis(100)))
            .await
            .unwrap();

        match future.wait().await {
            Err(CorrelationError::TimedOut { command_id, .. }) => {
                assert_eq!(command_id, msg.command_id)
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(correlator.pending_count(), 0);
        correlator.shutdown().await;
    }

    #[tokio::test]
    async fn test_new_work_interrupts_older_pending() {
        let (correlator, client, triplet) = harness().await;
        let first = work();
        let first_future = correlator.submit(&first, &triplet, None).await.unwrap();

        let second = work();
        let second_future = correlator.submit(&second, &triplet, None).await.unwrap();

        // First future resolves interrupted, attributed to the second command
        let outcome = first_future.wait().await.unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.interrupted_by, Some(second.command_id));
        assert!(outcome
            .summary
            .as_deref()
            .unwrap()
            .starts_with("Interrupted:"));

        // Input queue ordering: first work, then interrupt, then second work
        let msgs = client
            .receive_responses(&triplet.input_url, 10, Duration::ZERO)
            .await
            .unwrap();
        let kinds: Vec<&str> = msgs
            .iter()
            .map(|m| match m.parse_payload().unwrap() {
                QueuePayload::Work(_) => "work",
                QueuePayload::Interrupt(_) => "interrupt",
                other => other.kind(),
            })
            .collect();
        assert_eq!(kinds, vec!["work", "interrupt", "work"]);

        // Second command still completes normally
        post_response(&client, &triplet, response_for(second.command_id)).await;
        assert!(second_future.wait().await.unwrap().success);
        correlator.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (correlator, _, triplet) = harness().await;
        let msg = work();
        let future = correlator.submit(&msg, &triplet, None).await.unwrap();

        correlator.cancel(msg.command_id);
        correlator.cancel(msg.command_id); // double-invocation no-op

        assert!(matches!(
            future.wait().await,
            Err(CorrelationError::Cancelled { .. })
        ));
        correlator.shutdown().await;
    }

    #[tokio::test]
    async fn test_interrupt_tenant_resolves_all() {
        let (correlator, _, triplet) = harness().await;
        // Two pendings registered directly (router already sent the work)
        let a = work();
        let b = work();
        let fa = correlator.register(&a, &triplet, None).unwrap();
        // Registering a second command for the tenant without the interrupt
        // path models two routes racing before either resolves
        let fb = correlator.register(&b, &triplet, None).unwrap();

        correlator.interrupt(&tenant(), "session closed").await;

        for f in [fa, fb] {
            let outcome = f.wait().await.unwrap();
            assert!(outcome.interrupted);
            assert_eq!(outcome.summary.as_deref(), Some("Interrupted: session closed"));
            assert!(outcome.interrupted_by.is_none());
        }

        // Idempotent on empty state
        correlator.interrupt(&tenant(), "again").await;
        correlator.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_command_id_is_fatal() {
        let (correlator, _, triplet) = harness().await;
        let msg = work();
        let _future = correlator.register(&msg, &triplet, None).unwrap();
        let err = correlator.register(&msg, &triplet, None).unwrap_err();
        assert!(matches!(err, HermesError::Fatal(_)));
        correlator.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_and_joins_loops() {
        let (correlator, _, triplet) = harness().await;
        let msg = work();
        let future = correlator.submit(&msg, &triplet, None).await.unwrap();

        correlator.shutdown().await;

        assert!(matches!(
            future.wait().await,
            Err(CorrelationError::Cancelled { .. })
        ));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_work_send_failure_cleans_pending() {
        let (correlator, _, triplet) = harness().await;
        let broken = QueueTriplet {
            input_url: QueueUrl::new("memory://queues/missing"),
            ..triplet
        };
        let err = correlator.submit(&work(), &broken, None).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(correlator.pending_count(), 0);
        correlator.shutdown().await;
    }
}
