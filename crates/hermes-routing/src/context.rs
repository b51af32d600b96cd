//! # Core Context
//!
//! Explicit construction of the handles the engine runs on: configuration,
//! the queue client, and the durable stores. No construction-time global
//! caching - tests substitute in-memory providers by building the same
//! value with different backends.

use std::sync::Arc;

use tracing::info;

use hermes_shared::config::{HermesConfig, QueueBackend, StorageBackend};
use hermes_shared::messaging::service::QueueProvider;
use hermes_shared::messaging::{QueueClient, QueueNamerKind};
use hermes_shared::resilience::{CircuitBreaker, CircuitBreakerConfig};
use hermes_shared::storage::StorageProvider;
use hermes_shared::{HermesError, HermesResult};

/// Shared handles for every core component
#[derive(Debug, Clone)]
pub struct CoreContext {
    pub config: HermesConfig,
    pub client: Arc<QueueClient>,
    pub storage: Arc<StorageProvider>,
}

impl CoreContext {
    /// Build from configuration, connecting the configured backends
    pub async fn from_config(config: HermesConfig) -> HermesResult<Self> {
        let queue_provider = match config.queue.backend {
            QueueBackend::Memory => QueueProvider::new_in_memory(),
            QueueBackend::Pgmq => {
                let url = config.queue.database_url.as_deref().ok_or_else(|| {
                    HermesError::Configuration(
                        "queue.database_url required for the pgmq backend".to_string(),
                    )
                })?;
                QueueProvider::new_pgmq(url).await?
            }
        };

        let storage = match config.storage.backend {
            StorageBackend::Memory => StorageProvider::new_memory(),
            StorageBackend::Postgres => {
                let url = config.storage.database_url.as_deref().ok_or_else(|| {
                    HermesError::Configuration(
                        "storage.database_url required for the postgres backend".to_string(),
                    )
                })?;
                StorageProvider::new_postgres(url).await?
            }
        };

        let namer = QueueNamerKind::with_prefix(config.queue.prefix.clone());
        let breaker = Arc::new(CircuitBreaker::new(
            "messaging".to_string(),
            CircuitBreakerConfig {
                failure_threshold: config.breaker.failure_threshold,
                timeout: std::time::Duration::from_secs(config.breaker.recovery_timeout_secs),
                success_threshold: config.breaker.success_threshold,
            },
        ));
        let client = Arc::new(QueueClient::with_circuit_breaker(
            Arc::new(queue_provider),
            namer,
            breaker,
        ));

        info!(
            queue_backend = client.provider_name(),
            storage_backend = storage.provider_name(),
            prefix = %config.queue.prefix,
            "Core context constructed"
        );

        Ok(Self {
            config,
            client,
            storage: Arc::new(storage),
        })
    }

    /// In-memory context for tests and local runs
    pub fn in_memory(config: HermesConfig) -> Self {
        let namer = QueueNamerKind::with_prefix(config.queue.prefix.clone());
        Self {
            config,
            client: Arc::new(QueueClient::new(
                Arc::new(QueueProvider::new_in_memory()),
                namer,
            )),
            storage: Arc::new(StorageProvider::new_memory()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_context() {
        let ctx = CoreContext::in_memory(HermesConfig::default());
        assert_eq!(ctx.client.provider_name(), "in_memory");
        assert_eq!(ctx.storage.provider_name(), "memory");
        assert!(ctx.client.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_from_config_memory_backends() {
        let ctx = CoreContext::from_config(HermesConfig::default()).await.unwrap();
        assert_eq!(ctx.client.provider_name(), "in_memory");
        assert!(ctx.client.circuit_breaker().is_some());
    }

    #[tokio::test]
    async fn test_pgmq_backend_requires_url() {
        let mut config = HermesConfig::default();
        config.queue.backend = QueueBackend::Pgmq;
        let err = CoreContext::from_config(config).await.unwrap_err();
        assert!(matches!(err, HermesError::Configuration(_)));
    }
}
