//! # Postgres Storage
//!
//! Durable implementation of the four store traits over plain tables,
//! sharing a connection pool with the PGMQ queue provider when both point
//! at the same database. Schema is bootstrapped by
//! [`PostgresStorage::ensure_schema`].
//!
//! Thread-mapping TTL is column-based (`expires_at`): reads filter expired
//! rows, the reaper's sweep deletes them and reports the count.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::super::error::StorageError;
use super::super::traits::{
    OwnershipStore, QueueRegistryStore, SessionIndexStore, ThreadMappingStore,
};
use super::super::types::{OwnershipRecord, OwnershipStatus, QueueTripletRecord, SessionRecord};
use crate::messaging::service::{QueueTriplet, QueueUrl};
use crate::types::{TenantKey, ThreadId, ThreadMapping, Transport};

const THREADS_TABLE: &str = "hermes_thread_mappings";
const REGISTRY_TABLE: &str = "hermes_queue_registry";
const OWNERSHIP_TABLE: &str = "hermes_ownership";
const SESSIONS_TABLE: &str = "hermes_session_index";

/// Postgres implementation of all four stores
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect and bootstrap the schema
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::connection(e.to_string()))?;
        let storage = Self::with_pool(pool);
        storage.ensure_schema().await?;
        Ok(storage)
    }

    /// Use an externally managed pool (schema bootstrap is the caller's job)
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the four tables if they do not exist
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS hermes_thread_mappings (
                thread_id TEXT PRIMARY KEY,
                tenant_key TEXT NOT NULL,
                first_seen_at TIMESTAMPTZ NOT NULL,
                last_activity_at TIMESTAMPTZ NOT NULL,
                message_count BIGINT NOT NULL,
                last_transport TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS hermes_queue_registry (
                tenant_key TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                input_url TEXT NOT NULL,
                output_url TEXT NOT NULL,
                dlq_url TEXT NOT NULL,
                PRIMARY KEY (tenant_key, created_at)
            )",
            "CREATE TABLE IF NOT EXISTS hermes_ownership (
                tenant_key TEXT PRIMARY KEY,
                worker_id TEXT NOT NULL,
                status TEXT NOT NULL,
                last_heartbeat_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS hermes_session_index (
                session_id TEXT PRIMARY KEY,
                tenant_key TEXT NOT NULL,
                thread_id TEXT,
                last_activity_at TIMESTAMPTZ NOT NULL
            )",
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::connection(format!("schema bootstrap failed: {e}")))?;
        }
        Ok(())
    }

    fn parse_tenant(table: &str, raw: &str) -> Result<TenantKey, StorageError> {
        TenantKey::parse_canonical(raw)
            .map_err(|e| StorageError::corrupt(table, format!("bad tenant key '{raw}': {e}")))
    }

    fn parse_transport(raw: &str) -> Result<Transport, StorageError> {
        raw.parse()
            .map_err(|e| StorageError::corrupt(THREADS_TABLE, e))
    }
}

#[async_trait]
impl ThreadMappingStore for PostgresStorage {
    async fn get_mapping(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Option<ThreadMapping>, StorageError> {
        let row = sqlx::query(
            "SELECT thread_id, tenant_key, first_seen_at, last_activity_at,
                    message_count, last_transport, expires_at
             FROM hermes_thread_mappings
             WHERE thread_id = $1 AND expires_at > $2",
        )
        .bind(thread_id.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::read(THREADS_TABLE, e.to_string()))?;

        let Some(row) = row else { return Ok(None) };

        let tenant_raw: String = row
            .try_get("tenant_key")
            .map_err(|e| StorageError::read(THREADS_TABLE, e.to_string()))?;
        let transport_raw: String = row
            .try_get("last_transport")
            .map_err(|e| StorageError::read(THREADS_TABLE, e.to_string()))?;
        let message_count: i64 = row
            .try_get("message_count")
            .map_err(|e| StorageError::read(THREADS_TABLE, e.to_string()))?;

        Ok(Some(ThreadMapping {
            thread_id: thread_id.clone(),
            tenant: Self::parse_tenant(THREADS_TABLE, &tenant_raw)?,
            first_seen_at: row
                .try_get("first_seen_at")
                .map_err(|e| StorageError::read(THREADS_TABLE, e.to_string()))?,
            last_activity_at: row
                .try_get("last_activity_at")
                .map_err(|e| StorageError::read(THREADS_TABLE, e.to_string()))?,
            message_count: message_count.max(0) as u64,
            last_transport: Self::parse_transport(&transport_raw)?,
            expires_at: row
                .try_get("expires_at")
                .map_err(|e| StorageError::read(THREADS_TABLE, e.to_string()))?,
        }))
    }

    async fn insert_mapping_if_absent(
        &self,
        mapping: &ThreadMapping,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "INSERT INTO hermes_thread_mappings
                 (thread_id, tenant_key, first_seen_at, last_activity_at,
                  message_count, last_transport, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (thread_id) DO NOTHING",
        )
        .bind(mapping.thread_id.as_str())
        .bind(mapping.tenant.canonical())
        .bind(mapping.first_seen_at)
        .bind(mapping.last_activity_at)
        .bind(mapping.message_count as i64)
        .bind(mapping.last_transport.to_string())
        .bind(mapping.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::write(THREADS_TABLE, e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn touch_mapping(
        &self,
        thread_id: &ThreadId,
        transport: Transport,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let expires_at = now + chrono::Duration::days(crate::types::thread::THREAD_TTL_DAYS);
        let result = sqlx::query(
            "UPDATE hermes_thread_mappings
             SET last_activity_at = $2,
                 message_count = message_count + 1,
                 last_transport = $3,
                 expires_at = $4
             WHERE thread_id = $1",
        )
        .bind(thread_id.as_str())
        .bind(now)
        .bind(transport.to_string())
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::write(THREADS_TABLE, e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn sweep_expired_mappings(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let result = sqlx::query("DELETE FROM hermes_thread_mappings WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::write(THREADS_TABLE, e.to_string()))?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl QueueRegistryStore for PostgresStorage {
    async fn put_triplet(&self, record: &QueueTripletRecord) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO hermes_queue_registry
                 (tenant_key, created_at, input_url, output_url, dlq_url)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (tenant_key, created_at) DO NOTHING",
        )
        .bind(record.tenant.canonical())
        .bind(record.created_at)
        .bind(record.triplet.input_url.as_str())
        .bind(record.triplet.output_url.as_str())
        .bind(record.triplet.dlq_url.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::write(REGISTRY_TABLE, e.to_string()))?;
        Ok(())
    }

    async fn latest_triplet(
        &self,
        tenant: &TenantKey,
    ) -> Result<Option<QueueTripletRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT created_at, input_url, output_url, dlq_url
             FROM hermes_queue_registry
             WHERE tenant_key = $1
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(tenant.canonical())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::read(REGISTRY_TABLE, e.to_string()))?;

        let Some(row) = row else { return Ok(None) };

        let get_url = |col: &str| -> Result<QueueUrl, StorageError> {
            row.try_get::<String, _>(col)
                .map(QueueUrl::new)
                .map_err(|e| StorageError::read(REGISTRY_TABLE, e.to_string()))
        };

        Ok(Some(QueueTripletRecord {
            tenant: tenant.clone(),
            triplet: QueueTriplet {
                input_url: get_url("input_url")?,
                output_url: get_url("output_url")?,
                dlq_url: get_url("dlq_url")?,
            },
            created_at: row
                .try_get("created_at")
                .map_err(|e| StorageError::read(REGISTRY_TABLE, e.to_string()))?,
        }))
    }

    async fn remove_triplets(&self, tenant: &TenantKey) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM hermes_queue_registry WHERE tenant_key = $1")
            .bind(tenant.canonical())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::write(REGISTRY_TABLE, e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl OwnershipStore for PostgresStorage {
    async fn ownership(
        &self,
        tenant: &TenantKey,
    ) -> Result<Option<OwnershipRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT worker_id, status, last_heartbeat_at
             FROM hermes_ownership
             WHERE tenant_key = $1",
        )
        .bind(tenant.canonical())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::read(OWNERSHIP_TABLE, e.to_string()))?;

        let Some(row) = row else { return Ok(None) };

        let status_raw: String = row
            .try_get("status")
            .map_err(|e| StorageError::read(OWNERSHIP_TABLE, e.to_string()))?;
        let status = match status_raw.as_str() {
            "active" => OwnershipStatus::Active,
            "inactive" => OwnershipStatus::Inactive,
            other => {
                return Err(StorageError::corrupt(
                    OWNERSHIP_TABLE,
                    format!("unknown status '{other}'"),
                ))
            }
        };

        Ok(Some(OwnershipRecord {
            tenant: tenant.clone(),
            worker_id: row
                .try_get("worker_id")
                .map_err(|e| StorageError::read(OWNERSHIP_TABLE, e.to_string()))?,
            status,
            last_heartbeat_at: row
                .try_get("last_heartbeat_at")
                .map_err(|e| StorageError::read(OWNERSHIP_TABLE, e.to_string()))?,
        }))
    }

    async fn put_ownership(&self, record: &OwnershipRecord) -> Result<(), StorageError> {
        let status = match record.status {
            OwnershipStatus::Active => "active",
            OwnershipStatus::Inactive => "inactive",
        };
        sqlx::query(
            "INSERT INTO hermes_ownership (tenant_key, worker_id, status, last_heartbeat_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (tenant_key) DO UPDATE
                SET worker_id = EXCLUDED.worker_id,
                    status = EXCLUDED.status,
                    last_heartbeat_at = EXCLUDED.last_heartbeat_at",
        )
        .bind(record.tenant.canonical())
        .bind(&record.worker_id)
        .bind(status)
        .bind(record.last_heartbeat_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::write(OWNERSHIP_TABLE, e.to_string()))?;
        Ok(())
    }

    async fn set_ownership_status(
        &self,
        tenant: &TenantKey,
        status: OwnershipStatus,
    ) -> Result<bool, StorageError> {
        let status = match status {
            OwnershipStatus::Active => "active",
            OwnershipStatus::Inactive => "inactive",
        };
        let result = sqlx::query("UPDATE hermes_ownership SET status = $2 WHERE tenant_key = $1")
            .bind(tenant.canonical())
            .bind(status)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::write(OWNERSHIP_TABLE, e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    async fn active_ownerships(&self) -> Result<Vec<OwnershipRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT tenant_key, worker_id, last_heartbeat_at
             FROM hermes_ownership
             WHERE status = 'active'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::read(OWNERSHIP_TABLE, e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let tenant_raw: String = row
                .try_get("tenant_key")
                .map_err(|e| StorageError::read(OWNERSHIP_TABLE, e.to_string()))?;
            records.push(OwnershipRecord {
                tenant: Self::parse_tenant(OWNERSHIP_TABLE, &tenant_raw)?,
                worker_id: row
                    .try_get("worker_id")
                    .map_err(|e| StorageError::read(OWNERSHIP_TABLE, e.to_string()))?,
                status: OwnershipStatus::Active,
                last_heartbeat_at: row
                    .try_get("last_heartbeat_at")
                    .map_err(|e| StorageError::read(OWNERSHIP_TABLE, e.to_string()))?,
            });
        }
        Ok(records)
    }
}

#[async_trait]
impl SessionIndexStore for PostgresStorage {
    async fn session(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT tenant_key, thread_id, last_activity_at
             FROM hermes_session_index
             WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::read(SESSIONS_TABLE, e.to_string()))?;

        let Some(row) = row else { return Ok(None) };

        let tenant_raw: String = row
            .try_get("tenant_key")
            .map_err(|e| StorageError::read(SESSIONS_TABLE, e.to_string()))?;
        let thread_id: Option<String> = row
            .try_get("thread_id")
            .map_err(|e| StorageError::read(SESSIONS_TABLE, e.to_string()))?;

        Ok(Some(SessionRecord {
            session_id: session_id.to_string(),
            tenant: Self::parse_tenant(SESSIONS_TABLE, &tenant_raw)?,
            thread_id: thread_id.map(ThreadId::new),
            last_activity_at: row
                .try_get("last_activity_at")
                .map_err(|e| StorageError::read(SESSIONS_TABLE, e.to_string()))?,
        }))
    }

    async fn put_session(&self, record: &SessionRecord) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO hermes_session_index
                 (session_id, tenant_key, thread_id, last_activity_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (session_id) DO UPDATE
                SET tenant_key = EXCLUDED.tenant_key,
                    thread_id = EXCLUDED.thread_id,
                    last_activity_at = EXCLUDED.last_activity_at",
        )
        .bind(&record.session_id)
        .bind(record.tenant.canonical())
        .bind(record.thread_id.as_ref().map(|t| t.as_str().to_string()))
        .bind(record.last_activity_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::write(SESSIONS_TABLE, e.to_string()))?;
        Ok(())
    }
}
