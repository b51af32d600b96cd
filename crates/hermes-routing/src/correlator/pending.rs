//! # Pending Commands
//!
//! In-core entries for outstanding commands and the future handed back to
//! callers. The pending map is strictly derived state: it is intentionally
//! lost on restart, and timeouts surface the dropped futures.

use std::time::Instant;

use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use hermes_shared::messaging::service::QueueUrl;
use hermes_shared::messaging::ResponseMessage;
use hermes_shared::types::{TenantKey, ThreadId, Transport};

/// Terminal non-response outcomes. These are normal results of a submit,
/// not exceptions; interruption arrives as a synthetic `ResponseMessage`
/// with `interrupted = true`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("command {command_id} timed out after {after_secs}s")]
    TimedOut { command_id: Uuid, after_secs: u64 },

    #[error("command {command_id} was cancelled")]
    Cancelled { command_id: Uuid },
}

/// What a pending future ultimately resolves to
pub type CommandOutcome = Result<ResponseMessage, CorrelationError>;

/// One outstanding command awaiting its worker response
#[derive(Debug)]
pub(crate) struct PendingEntry {
    pub command_id: Uuid,
    pub tenant: TenantKey,
    #[allow(dead_code)]
    pub thread_id: ThreadId,
    pub session_id: String,
    pub source: Transport,
    pub input_url: QueueUrl,
    pub output_url: QueueUrl,
    pub submitted_at: Instant,
    pub deadline: Instant,
    pub completer: oneshot::Sender<CommandOutcome>,
}

impl PendingEntry {
    /// Resolve the future; a dropped receiver is a no-op
    pub fn resolve(self, outcome: CommandOutcome) {
        let _ = self.completer.send(outcome);
    }
}

/// Handle resolving to the command's outcome
#[derive(Debug)]
pub struct ResponseFuture {
    command_id: Uuid,
    rx: oneshot::Receiver<CommandOutcome>,
}

impl ResponseFuture {
    pub(crate) fn new(command_id: Uuid, rx: oneshot::Receiver<CommandOutcome>) -> Self {
        Self { command_id, rx }
    }

    pub fn command_id(&self) -> Uuid {
        self.command_id
    }

    /// Wait for the outcome. A correlator torn down without resolving reads
    /// as cancellation.
    pub async fn wait(self) -> CommandOutcome {
        let command_id = self.command_id;
        self.rx
            .await
            .unwrap_or(Err(CorrelationError::Cancelled { command_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_future_resolves_once() {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let future = ResponseFuture::new(id, rx);
        tx.send(Err(CorrelationError::Cancelled { command_id: id }))
            .unwrap();
        assert_eq!(
            future.wait().await,
            Err(CorrelationError::Cancelled { command_id: id })
        );
    }

    #[tokio::test]
    async fn test_dropped_completer_reads_as_cancelled() {
        let (tx, rx) = oneshot::channel::<CommandOutcome>();
        let id = Uuid::new_v4();
        let future = ResponseFuture::new(id, rx);
        drop(tx);
        assert!(matches!(
            future.wait().await,
            Err(CorrelationError::Cancelled { .. })
        ));
    }
}
