//! # Store Traits
//!
//! One trait per persistence table. Providers implement all four; consumers
//! dispatch through the [`StorageProvider`] enum.
//!
//! Write discipline (shared-resource policy): thread mappings are
//! conditional on an immutable-once-written key, every other write is keyed
//! solely by tenant, so concurrent writers to different tenants never
//! collide and no distributed lock is needed.
//!
//! [`StorageProvider`]: super::providers::StorageProvider

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageError;
use super::types::{OwnershipRecord, OwnershipStatus, QueueTripletRecord, SessionRecord};
use crate::types::{TenantKey, ThreadId, ThreadMapping, Transport};

/// Thread → tenant mapping table, keyed by thread id
#[async_trait]
pub trait ThreadMappingStore: Send + Sync {
    /// Fetch a live (non-expired) mapping
    async fn get_mapping(&self, thread_id: &ThreadId) -> Result<Option<ThreadMapping>, StorageError>;

    /// Insert only if the thread id is unseen. Returns `false` when a
    /// mapping already exists - the tenant binding is immutable.
    async fn insert_mapping_if_absent(&self, mapping: &ThreadMapping)
        -> Result<bool, StorageError>;

    /// Record a follow-up message: bump activity, count, transport, TTL.
    /// Returns `false` when no mapping exists.
    async fn touch_mapping(
        &self,
        thread_id: &ThreadId,
        transport: Transport,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Remove expired mappings, returning how many were dropped. Backends
    /// with native TTL may only report the count.
    async fn sweep_expired_mappings(&self, now: DateTime<Utc>) -> Result<usize, StorageError>;
}

/// Queue registry table, keyed `(tenantKey, createdAt)`
#[async_trait]
pub trait QueueRegistryStore: Send + Sync {
    async fn put_triplet(&self, record: &QueueTripletRecord) -> Result<(), StorageError>;

    /// Newest triplet for a tenant
    async fn latest_triplet(
        &self,
        tenant: &TenantKey,
    ) -> Result<Option<QueueTripletRecord>, StorageError>;

    /// Drop every registry row for a tenant (decommission)
    async fn remove_triplets(&self, tenant: &TenantKey) -> Result<(), StorageError>;
}

/// Ownership table, keyed by tenant
#[async_trait]
pub trait OwnershipStore: Send + Sync {
    async fn ownership(&self, tenant: &TenantKey) -> Result<Option<OwnershipRecord>, StorageError>;

    /// Upsert a record. In production workers write these; the core writes
    /// only through `set_ownership_status`.
    async fn put_ownership(&self, record: &OwnershipRecord) -> Result<(), StorageError>;

    /// Flip a record's status. Returns `false` when no record exists.
    async fn set_ownership_status(
        &self,
        tenant: &TenantKey,
        status: OwnershipStatus,
    ) -> Result<bool, StorageError>;

    /// Every record currently marked active
    async fn active_ownerships(&self) -> Result<Vec<OwnershipRecord>, StorageError>;
}

/// Session index, keyed by session id (read-only to the core)
#[async_trait]
pub trait SessionIndexStore: Send + Sync {
    async fn session(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError>;

    /// Present for fixtures and the ingress edge; the routing core never
    /// calls this.
    async fn put_session(&self, record: &SessionRecord) -> Result<(), StorageError>;
}
