//! # In-Memory Storage
//!
//! Process-local implementation of the four store traits, used by tests and
//! single-process deployments. Maps are keyed the same way the durable
//! tables are so the semantics match.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use super::super::error::StorageError;
use super::super::traits::{
    OwnershipStore, QueueRegistryStore, SessionIndexStore, ThreadMappingStore,
};
use super::super::types::{OwnershipRecord, OwnershipStatus, QueueTripletRecord, SessionRecord};
use crate::types::{TenantKey, ThreadId, ThreadMapping, Transport};

/// In-memory implementation of all four stores
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    threads: Arc<DashMap<ThreadId, ThreadMapping>>,
    /// Registry rows per tenant, appended in creation order
    registry: Arc<DashMap<String, Vec<QueueTripletRecord>>>,
    ownership: Arc<DashMap<String, OwnershipRecord>>,
    sessions: Arc<DashMap<String, SessionRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadMappingStore for MemoryStorage {
    async fn get_mapping(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Option<ThreadMapping>, StorageError> {
        Ok(self
            .threads
            .get(thread_id)
            .filter(|m| !m.is_expired(Utc::now()))
            .map(|m| m.clone()))
    }

    async fn insert_mapping_if_absent(
        &self,
        mapping: &ThreadMapping,
    ) -> Result<bool, StorageError> {
        let mut inserted = false;
        self.threads
            .entry(mapping.thread_id.clone())
            .or_insert_with(|| {
                inserted = true;
                mapping.clone()
            });
        Ok(inserted)
    }

    async fn touch_mapping(
        &self,
        thread_id: &ThreadId,
        transport: Transport,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        match self.threads.get_mut(thread_id) {
            Some(mut mapping) => {
                mapping.touch(transport, now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn sweep_expired_mappings(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let before = self.threads.len();
        self.threads.retain(|_, m| !m.is_expired(now));
        Ok(before - self.threads.len())
    }
}

#[async_trait]
impl QueueRegistryStore for MemoryStorage {
    async fn put_triplet(&self, record: &QueueTripletRecord) -> Result<(), StorageError> {
        self.registry
            .entry(record.tenant.canonical())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn latest_triplet(
        &self,
        tenant: &TenantKey,
    ) -> Result<Option<QueueTripletRecord>, StorageError> {
        Ok(self.registry.get(&tenant.canonical()).and_then(|rows| {
            rows.iter()
                .max_by_key(|r| r.created_at)
                .cloned()
        }))
    }

    async fn remove_triplets(&self, tenant: &TenantKey) -> Result<(), StorageError> {
        self.registry.remove(&tenant.canonical());
        Ok(())
    }
}

#[async_trait]
impl OwnershipStore for MemoryStorage {
    async fn ownership(
        &self,
        tenant: &TenantKey,
    ) -> Result<Option<OwnershipRecord>, StorageError> {
        Ok(self.ownership.get(&tenant.canonical()).map(|r| r.clone()))
    }

    async fn put_ownership(&self, record: &OwnershipRecord) -> Result<(), StorageError> {
        self.ownership
            .insert(record.tenant.canonical(), record.clone());
        Ok(())
    }

    async fn set_ownership_status(
        &self,
        tenant: &TenantKey,
        status: OwnershipStatus,
    ) -> Result<bool, StorageError> {
        match self.ownership.get_mut(&tenant.canonical()) {
            Some(mut record) => {
                record.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn active_ownerships(&self) -> Result<Vec<OwnershipRecord>, StorageError> {
        Ok(self
            .ownership
            .iter()
            .filter(|r| r.status == OwnershipStatus::Active)
            .map(|r| r.clone())
            .collect())
    }
}

#[async_trait]
impl SessionIndexStore for MemoryStorage {
    async fn session(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self.sessions.get(session_id).map(|r| r.clone()))
    }

    async fn put_session(&self, record: &SessionRecord) -> Result<(), StorageError> {
        self.sessions
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }
}
