//! # Per-Tenant Ordered Senders
//!
//! One drain task plus an in-memory ordered channel per tenant, so work
//! messages for a tenant reach its input queue in the order routing decided
//! them. Interrupt messages share the channel, which is what guarantees an
//! interrupt enqueued before new work is observable before it.
//!
//! Each job is attempted twice (one retry with a short backoff) before its
//! failure is reported back to the submitter.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use hermes_shared::messaging::service::{MessageId, QueueUrl};
use hermes_shared::messaging::{InterruptMessage, MessagingError, QueueClient, WorkMessage};
use hermes_shared::types::{TenantKey, Transport};
use hermes_shared::{HermesError, HermesResult};

/// Queued jobs per tenant before send-side backpressure kicks in
const CHANNEL_CAPACITY: usize = 64;

/// Backoff before the single retry of a failed send
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum SendJob {
    Work {
        url: QueueUrl,
        message: Box<WorkMessage>,
        resp: oneshot::Sender<Result<MessageId, MessagingError>>,
    },
    Interrupt {
        url: QueueUrl,
        message: Box<InterruptMessage>,
        source: Transport,
    },
}

/// Ordered send channels keyed by tenant
#[derive(Debug)]
pub(crate) struct TenantSenders {
    client: Arc<QueueClient>,
    channels: DashMap<String, mpsc::Sender<SendJob>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl TenantSenders {
    pub fn new(client: Arc<QueueClient>, shutdown: CancellationToken) -> Self {
        Self {
            client,
            channels: DashMap::new(),
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    /// Send a work message through the tenant's ordered channel and wait
    /// for the queue write to complete
    pub async fn send_work(
        &self,
        tenant: &TenantKey,
        url: &QueueUrl,
        message: &WorkMessage,
    ) -> HermesResult<MessageId> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(
            tenant,
            SendJob::Work {
                url: url.clone(),
                message: Box::new(message.clone()),
                resp: tx,
            },
        )
        .await?;
        match rx.await {
            Ok(Ok(id)) => Ok(id),
            Ok(Err(e)) => Err(HermesError::Transient(format!(
                "work send failed for {tenant}: {e}"
            ))),
            Err(_) => Err(HermesError::Transient(format!(
                "sender task dropped before completing work send for {tenant}"
            ))),
        }
    }

    /// Enqueue an interrupt ahead of any later work on the same channel.
    /// Fire-and-forget: a lost interrupt is recovered by the worker seeing
    /// the newer work message.
    pub async fn send_interrupt(
        &self,
        tenant: &TenantKey,
        url: &QueueUrl,
        message: InterruptMessage,
        source: Transport,
    ) -> HermesResult<()> {
        self.enqueue(
            tenant,
            SendJob::Interrupt {
                url: url.clone(),
                message: Box::new(message),
                source,
            },
        )
        .await
    }

    /// Close all channels and wait for drain tasks to finish in-flight jobs
    pub async fn shutdown(&self) {
        self.channels.clear();
        self.tracker.close();
        self.tracker.wait().await;
    }

    async fn enqueue(&self, tenant: &TenantKey, job: SendJob) -> HermesResult<()> {
        let sender = self.channel_for(tenant);
        sender.send(job).await.map_err(|_| {
            HermesError::Transient(format!("send channel closed for tenant {tenant}"))
        })
    }

    fn channel_for(&self, tenant: &TenantKey) -> mpsc::Sender<SendJob> {
        self.channels
            .entry(tenant.canonical())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
                let client = self.client.clone();
                let shutdown = self.shutdown.clone();
                let tenant = tenant.canonical();
                self.tracker
                    .spawn(async move { drain_task(client, tenant, rx, shutdown).await });
                tx
            })
            .clone()
    }
}

/// Drains one tenant's channel, preserving job order
async fn drain_task(
    client: Arc<QueueClient>,
    tenant: String,
    mut rx: mpsc::Receiver<SendJob>,
    shutdown: CancellationToken,
) {
    debug!(tenant = %tenant, "Tenant sender started");
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        match job {
            SendJob::Work { url, message, resp } => {
                let result = send_with_retry(|| {
                    let client = client.clone();
                    let url = url.clone();
                    let message = (*message).clone();
                    async move { client.send_work(&url, &message).await }
                })
                .await;
                let _ = resp.send(result);
            }
            SendJob::Interrupt { url, message, source } => {
                let result = send_with_retry(|| {
                    let client = client.clone();
                    let url = url.clone();
                    let message = (*message).clone();
                    async move { client.send_interrupt(&url, &message, source).await }
                })
                .await;
                if let Err(e) = result {
                    warn!(tenant = %tenant, error = %e, "Interrupt send failed after retry");
                }
            }
        }
    }
    debug!(tenant = %tenant, "Tenant sender stopped");
}

/// Attempt a send twice with a short backoff between attempts
async fn send_with_retry<F, Fut>(mut op: F) -> Result<MessageId, MessagingError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<MessageId, MessagingError>>,
{
    match op().await {
        Ok(id) => Ok(id),
        Err(first) => {
            debug!(error = %first, "Send failed; retrying once");
            tokio::time::sleep(RETRY_BACKOFF).await;
            op().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hermes_shared::messaging::service::QueueProvider;
    use hermes_shared::messaging::{QueueNamerKind, QueuePayload};
    use hermes_shared::types::ThreadId;
    use uuid::Uuid;

    fn tenant() -> TenantKey {
        TenantKey::new("amelia", "scott").unwrap()
    }

    fn work(n: u32) -> WorkMessage {
        WorkMessage {
            command_id: Uuid::new_v4(),
            session_id: format!("sess-{n}"),
            tenant: tenant(),
            thread_id: ThreadId::new("aBcD1234"),
            instruction: format!("instruction {n}"),
            repo_url: Some("https://github.com/amelia/site.git".to_string()),
            user_email: None,
            source: Transport::Email,
            timestamp: Utc::now(),
            context: serde_json::Value::Null,
        }
    }

    fn senders() -> (Arc<TenantSenders>, Arc<QueueClient>, CancellationToken) {
        let client = Arc::new(QueueClient::new(
            Arc::new(QueueProvider::new_in_memory()),
            QueueNamerKind::default(),
        ));
        let shutdown = CancellationToken::new();
        (
            Arc::new(TenantSenders::new(client.clone(), shutdown.clone())),
            client,
            shutdown,
        )
    }

    #[tokio::test]
    async fn test_sends_preserve_order() {
        let (senders, client, _) = senders();
        let url = client.create_queue("input").await.unwrap();

        for n in 0..5 {
            senders.send_work(&tenant(), &url, &work(n)).await.unwrap();
        }

        let msgs = client
            .receive_responses(&url, 10, Duration::ZERO)
            .await
            .unwrap();
        let instructions: Vec<String> = msgs
            .iter()
            .map(|m| match m.parse_payload().unwrap() {
                QueuePayload::Work(w) => w.instruction,
                other => panic!("unexpected payload {}", other.kind()),
            })
            .collect();
        assert_eq!(
            instructions,
            (0..5).map(|n| format!("instruction {n}")).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_interrupt_precedes_later_work() {
        let (senders, client, _) = senders();
        let url = client.create_queue("input").await.unwrap();

        senders
            .send_interrupt(
                &tenant(),
                &url,
                InterruptMessage {
                    tenant: tenant(),
                    interrupted_by: Uuid::new_v4(),
                    reason: "new work arrived".to_string(),
                    timestamp: Utc::now(),
                },
                Transport::Email,
            )
            .await
            .unwrap();
        senders.send_work(&tenant(), &url, &work(1)).await.unwrap();

        let msgs = client
            .receive_responses(&url, 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(matches!(
            msgs[0].parse_payload().unwrap(),
            QueuePayload::Interrupt(_)
        ));
        assert!(matches!(
            msgs[1].parse_payload().unwrap(),
            QueuePayload::Work(_)
        ));
    }

    #[tokio::test]
    async fn test_send_failure_surfaces_as_transient() {
        let (senders, _, _) = senders();
        let missing = QueueUrl::new("memory://queues/missing");
        let err = senders
            .send_work(&tenant(), &missing, &work(1))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_shutdown_drains() {
        let (senders, client, _) = senders();
        let url = client.create_queue("input").await.unwrap();
        senders.send_work(&tenant(), &url, &work(1)).await.unwrap();
        senders.shutdown().await;

        // Channels are gone; further sends fail fast... by re-creating a
        // channel whose task the closed tracker refuses to run. Either way
        // the call must not hang.
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            senders.send_work(&tenant(), &url, &work(2)),
        )
        .await;
        assert!(result.is_ok(), "send after shutdown must not hang");
    }
}
