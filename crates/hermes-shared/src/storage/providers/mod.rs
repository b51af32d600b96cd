//! # Storage Providers
//!
//! Concrete store implementations plus the enum-dispatch wrapper. One
//! provider value backs all four tables so the memory and Postgres variants
//! share pools and lifetimes naturally.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

use chrono::{DateTime, Utc};

use super::error::StorageError;
use super::traits::{OwnershipStore, QueueRegistryStore, SessionIndexStore, ThreadMappingStore};
use super::types::{OwnershipRecord, OwnershipStatus, QueueTripletRecord, SessionRecord};
use crate::types::{TenantKey, ThreadId, ThreadMapping, Transport};

/// Enum dispatch over the available storage backends
#[derive(Debug, Clone)]
pub enum StorageProvider {
    Memory(MemoryStorage),
    Postgres(PostgresStorage),
}

impl StorageProvider {
    /// Process-local provider for tests and single-process deployments
    pub fn new_memory() -> Self {
        Self::Memory(MemoryStorage::new())
    }

    /// Durable Postgres provider
    pub async fn new_postgres(database_url: &str) -> Result<Self, StorageError> {
        Ok(Self::Postgres(PostgresStorage::new(database_url).await?))
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Postgres(_) => "postgres",
        }
    }

    // =========================================================================
    // Thread mappings
    // =========================================================================

    pub async fn get_mapping(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Option<ThreadMapping>, StorageError> {
        match self {
            Self::Memory(s) => s.get_mapping(thread_id).await,
            Self::Postgres(s) => s.get_mapping(thread_id).await,
        }
    }

    pub async fn insert_mapping_if_absent(
        &self,
        mapping: &ThreadMapping,
    ) -> Result<bool, StorageError> {
        match self {
            Self::Memory(s) => s.insert_mapping_if_absent(mapping).await,
            Self::Postgres(s) => s.insert_mapping_if_absent(mapping).await,
        }
    }

    pub async fn touch_mapping(
        &self,
        thread_id: &ThreadId,
        transport: Transport,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        match self {
            Self::Memory(s) => s.touch_mapping(thread_id, transport, now).await,
            Self::Postgres(s) => s.touch_mapping(thread_id, transport, now).await,
        }
    }

    pub async fn sweep_expired_mappings(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        match self {
            Self::Memory(s) => s.sweep_expired_mappings(now).await,
            Self::Postgres(s) => s.sweep_expired_mappings(now).await,
        }
    }

    // =========================================================================
    // Queue registry
    // =========================================================================

    pub async fn put_triplet(&self, record: &QueueTripletRecord) -> Result<(), StorageError> {
        match self {
            Self::Memory(s) => s.put_triplet(record).await,
            Self::Postgres(s) => s.put_triplet(record).await,
        }
    }

    pub async fn latest_triplet(
        &self,
        tenant: &TenantKey,
    ) -> Result<Option<QueueTripletRecord>, StorageError> {
        match self {
            Self::Memory(s) => s.latest_triplet(tenant).await,
            Self::Postgres(s) => s.latest_triplet(tenant).await,
        }
    }

    pub async fn remove_triplets(&self, tenant: &TenantKey) -> Result<(), StorageError> {
        match self {
            Self::Memory(s) => s.remove_triplets(tenant).await,
            Self::Postgres(s) => s.remove_triplets(tenant).await,
        }
    }

    // =========================================================================
    // Ownership
    // =========================================================================

    pub async fn ownership(
        &self,
        tenant: &TenantKey,
    ) -> Result<Option<OwnershipRecord>, StorageError> {
        match self {
            Self::Memory(s) => s.ownership(tenant).await,
            Self::Postgres(s) => s.ownership(tenant).await,
        }
    }

    pub async fn put_ownership(&self, record: &OwnershipRecord) -> Result<(), StorageError> {
        match self {
            Self::Memory(s) => s.put_ownership(record).await,
            Self::Postgres(s) => s.put_ownership(record).await,
        }
    }

    pub async fn set_ownership_status(
        &self,
        tenant: &TenantKey,
        status: OwnershipStatus,
    ) -> Result<bool, StorageError> {
        match self {
            Self::Memory(s) => s.set_ownership_status(tenant, status).await,
            Self::Postgres(s) => s.set_ownership_status(tenant, status).await,
        }
    }

    pub async fn active_ownerships(&self) -> Result<Vec<OwnershipRecord>, StorageError> {
        match self {
            Self::Memory(s) => s.active_ownerships().await,
            Self::Postgres(s) => s.active_ownerships().await,
        }
    }

    // =========================================================================
    // Session index
    // =========================================================================

    pub async fn session(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError> {
        match self {
            Self::Memory(s) => s.session(session_id).await,
            Self::Postgres(s) => s.session(session_id).await,
        }
    }

    pub async fn put_session(&self, record: &SessionRecord) -> Result<(), StorageError> {
        match self {
            Self::Memory(s) => s.put_session(record).await,
            Self::Postgres(s) => s.put_session(record).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_dispatch() {
        let provider = StorageProvider::new_memory();
        assert_eq!(provider.provider_name(), "memory");
        let tenant = TenantKey::new("amelia", "scott").unwrap();
        assert!(provider.ownership(&tenant).await.unwrap().is_none());
        assert!(provider.latest_triplet(&tenant).await.unwrap().is_none());
    }
}
