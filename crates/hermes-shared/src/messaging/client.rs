//! # QueueClient Domain Facade
//!
//! Domain-level messaging client for the routing core. Wraps the
//! [`QueueProvider`] enum and the queue naming scheme - no trait objects,
//! all enum dispatch.
//!
//! ## Circuit Breaker Integration
//!
//! The client optionally wraps send/receive operations with circuit breaker
//! protection. When the breaker is open, protected operations fail fast
//! with `MessagingError::CircuitBreakerOpen`. Unprotected operations (ack,
//! health check, queue management) bypass the breaker: failing an ack only
//! causes a redelivery, and the reaper must keep working while the breaker
//! is open.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::messages::{
    ClaimRequest, InterruptMessage, MessageAttributes, Priority, QueuePayload, WorkMessage,
};
use super::naming::QueueNamerKind;
use super::service::{
    MessageId, QueueInfo, QueueProvider, QueueStats, QueueTags, QueueUrl, QueuedMessage,
    ReceiptHandle, RedrivePolicy,
};
use super::MessagingError;
use crate::resilience::CircuitBreaker;
use crate::types::Transport;

/// Domain messaging client for the routing core
#[derive(Debug, Clone)]
pub struct QueueClient {
    /// The underlying queue backend
    provider: Arc<QueueProvider>,
    /// Queue naming scheme
    namer: QueueNamerKind,
    /// Optional circuit breaker for send/receive
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl QueueClient {
    /// Create a client without circuit breaker protection
    pub fn new(provider: Arc<QueueProvider>, namer: QueueNamerKind) -> Self {
        Self {
            provider,
            namer,
            circuit_breaker: None,
        }
    }

    /// Create a client with circuit breaker protection on send/receive
    pub fn with_circuit_breaker(
        provider: Arc<QueueProvider>,
        namer: QueueNamerKind,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            provider,
            namer,
            circuit_breaker: Some(circuit_breaker),
        }
    }

    pub fn provider(&self) -> &Arc<QueueProvider> {
        &self.provider
    }

    pub fn namer(&self) -> &QueueNamerKind {
        &self.namer
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// Without a breaker the operation runs directly. With an open breaker
    /// it fails fast; outcomes are recorded for state transitions.
    async fn with_breaker<F, T, Fut>(&self, op: F) -> Result<T, MessagingError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, MessagingError>>,
    {
        if let Some(cb) = &self.circuit_breaker {
            if !cb.should_allow() {
                return Err(MessagingError::circuit_breaker_open("messaging"));
            }
            let start = Instant::now();
            let result = op().await;
            match &result {
                Ok(_) => cb.record_success(start.elapsed()),
                Err(_) => cb.record_failure(start.elapsed()),
            }
            result
        } else {
            op().await
        }
    }

    // =========================================================================
    // Domain Sends (PROTECTED)
    // =========================================================================

    /// Send a work message to a tenant's input queue
    pub async fn send_work(
        &self,
        input_url: &QueueUrl,
        message: &WorkMessage,
    ) -> Result<MessageId, MessagingError> {
        let attributes =
            MessageAttributes::new(&message.tenant, message.source, Priority::Normal);
        let payload = QueuePayload::Work(message.clone());
        let provider = self.provider.clone();
        let url = input_url.clone();
        self.with_breaker(|| async move {
            provider.send_message(&url, &payload, &attributes).await
        })
        .await
    }

    /// Send a high-priority interrupt ahead of new work on the input queue
    pub async fn send_interrupt(
        &self,
        input_url: &QueueUrl,
        message: &InterruptMessage,
        source: Transport,
    ) -> Result<MessageId, MessagingError> {
        let attributes = MessageAttributes::new(&message.tenant, source, Priority::High);
        let payload = QueuePayload::Interrupt(message.clone());
        let provider = self.provider.clone();
        let url = input_url.clone();
        self.with_breaker(|| async move {
            provider.send_message(&url, &payload, &attributes).await
        })
        .await
    }

    /// Publish a claim request on the shared unclaimed queue
    pub async fn send_claim(
        &self,
        unclaimed_url: &QueueUrl,
        claim: &ClaimRequest,
        source: Transport,
    ) -> Result<MessageId, MessagingError> {
        let attributes = MessageAttributes::new(&claim.tenant, source, Priority::Normal);
        let payload = QueuePayload::ClaimRequest(claim.clone());
        let provider = self.provider.clone();
        let url = unclaimed_url.clone();
        self.with_breaker(|| async move {
            provider.send_message(&url, &payload, &attributes).await
        })
        .await
    }

    /// Receive worker responses from a tenant's output queue (PROTECTED)
    pub async fn receive_responses(
        &self,
        output_url: &QueueUrl,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueuedMessage>, MessagingError> {
        let provider = self.provider.clone();
        let url = output_url.clone();
        self.with_breaker(|| async move {
            provider.receive_messages(&url, max_messages, wait).await
        })
        .await
    }

    // =========================================================================
    // Message Lifecycle (UNPROTECTED - safe to fail, causes redelivery)
    // =========================================================================

    /// Acknowledge (delete) a processed message
    pub async fn ack_message(
        &self,
        url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        self.provider.delete_message(url, receipt).await
    }

    // =========================================================================
    // Queue Management (UNPROTECTED - admin/startup/reaper ops)
    // =========================================================================

    /// Ensure the shared unclaimed queue exists, returning its URL
    pub async fn ensure_unclaimed_queue(&self) -> Result<QueueUrl, MessagingError> {
        self.provider
            .create_queue(&self.namer.unclaimed_queue())
            .await
    }

    pub async fn create_queue(&self, name: &str) -> Result<QueueUrl, MessagingError> {
        self.provider.create_queue(name).await
    }

    pub async fn delete_queue(&self, url: &QueueUrl) -> Result<(), MessagingError> {
        self.provider.delete_queue(url).await
    }

    pub async fn queue_url(&self, name: &str) -> Result<Option<QueueUrl>, MessagingError> {
        self.provider.queue_url(name).await
    }

    /// Enumerate queues managed by this deployment's naming scheme
    pub async fn list_managed_queues(&self) -> Result<Vec<QueueInfo>, MessagingError> {
        self.provider
            .list_queues(&self.namer.managed_prefix())
            .await
    }

    pub async fn set_redrive_policy(
        &self,
        url: &QueueUrl,
        policy: &RedrivePolicy,
    ) -> Result<(), MessagingError> {
        self.provider.set_redrive_policy(url, policy).await
    }

    pub async fn tag_queue(&self, url: &QueueUrl, tags: &QueueTags) -> Result<(), MessagingError> {
        self.provider.tag_queue(url, tags).await
    }

    // =========================================================================
    // Observability (UNPROTECTED - must work when breaker open)
    // =========================================================================

    pub async fn queue_stats(&self, url: &QueueUrl) -> Result<QueueStats, MessagingError> {
        self.provider.queue_stats(url).await
    }

    pub async fn health_check(&self) -> Result<bool, MessagingError> {
        self.provider.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitBreakerConfig;
    use crate::types::{TenantKey, ThreadId};
    use chrono::Utc;
    use uuid::Uuid;

    fn tenant() -> TenantKey {
        TenantKey::new("amelia", "scott").unwrap()
    }

    fn work_message() -> WorkMessage {
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

    fn create_test_client() -> QueueClient {
        QueueClient::new(
            Arc::new(QueueProvider::new_in_memory()),
            QueueNamerKind::default(),
        )
    }

    fn create_test_client_with_breaker() -> (QueueClient, Arc<CircuitBreaker>) {
        let breaker = Arc::new(CircuitBreaker::new(
            "messaging".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout: Duration::from_millis(100),
                success_threshold: 1,
            },
        ));
        let client = QueueClient::with_circuit_breaker(
            Arc::new(QueueProvider::new_in_memory()),
            QueueNamerKind::default(),
            breaker.clone(),
        );
        (client, breaker)
    }

    #[tokio::test]
    async fn test_send_and_receive_work() {
        let client = create_test_client();
        let url = client.create_queue("input").await.unwrap();

        let msg = work_message();
        client.send_work(&url, &msg).await.unwrap();

        let received = client
            .receive_responses(&url, 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(received.len(), 1);
        match received[0].parse_payload().unwrap() {
            QueuePayload::Work(w) => assert_eq!(w.command_id, msg.command_id),
            other => panic!("expected work payload, got {}", other.kind()),
        }
        assert_eq!(received[0].attributes.priority, Priority::Normal);
    }

    #[tokio::test]
    async fn test_interrupt_carries_high_priority() {
        let client = create_test_client();
        let url = client.create_queue("input").await.unwrap();

        let interrupt = InterruptMessage {
            tenant: tenant(),
            interrupted_by: Uuid::new_v4(),
            reason: "new work arrived".to_string(),
            timestamp: Utc::now(),
        };
        client
            .send_interrupt(&url, &interrupt, Transport::Email)
            .await
            .unwrap();

        let received = client
            .receive_responses(&url, 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(received[0].attributes.priority, Priority::High);
    }

    #[tokio::test]
    async fn test_ensure_unclaimed_queue() {
        let client = create_test_client();
        let url = client.ensure_unclaimed_queue().await.unwrap();
        assert_eq!(url.queue_name(), "webordinary-unclaimed");
        // Idempotent
        let again = client.ensure_unclaimed_queue().await.unwrap();
        assert_eq!(url, again);
    }

    #[tokio::test]
    async fn test_send_blocked_when_circuit_open() {
        let (client, breaker) = create_test_client_with_breaker();
        let url = client.create_queue("input").await.unwrap();

        breaker.force_open();

        let result = client.send_work(&url, &work_message()).await;
        assert!(matches!(
            result,
            Err(MessagingError::CircuitBreakerOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_ack_bypasses_circuit_breaker() {
        let (client, breaker) = create_test_client_with_breaker();
        let url = client.create_queue("input").await.unwrap();

        client.send_work(&url, &work_message()).await.unwrap();
        let received = client
            .receive_responses(&url, 10, Duration::ZERO)
            .await
            .unwrap();

        breaker.force_open();

        client
            .ack_message(&url, &received[0].receipt_handle)
            .await
            .unwrap();
        assert!(client.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_records_on_breaker() {
        let (client, breaker) = create_test_client_with_breaker();
        // Send to a queue that does not exist
        let missing = QueueUrl::new("memory://queues/missing");
        let result = client.send_work(&missing, &work_message()).await;
        assert!(result.is_err());
        assert_eq!(breaker.metrics().failure_count, 1);
        // threshold 1 - breaker is now open
        assert!(!breaker.should_allow());
    }
}
