//! # Configuration
//!
//! Environment-driven configuration for the routing core. Values load from
//! an optional `hermes.toml` plus `HERMES__`-prefixed environment variables
//! (environment wins, `__` separates nesting):
//!
//! ```text
//! HERMES__QUEUE__PREFIX=staging
//! HERMES__OWNERSHIP__FRESHNESS_SECS=120
//! HERMES__QUEUE__BACKEND=pgmq
//! ```
//!
//! The tenant-config table (sender identity → tenant + repo URL) normally
//! comes from the TOML file:
//!
//! ```toml
//! [[tenants]]
//! identity = "escottster@gmail.com"
//! project_id = "amelia"
//! user_id = "scott"
//! repo_url = "https://github.com/webordinary/amelia-site.git"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{HermesError, HermesResult};
use crate::messaging::DEFAULT_QUEUE_PREFIX;
use crate::types::TenantKey;

/// Selects the queue backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Memory,
    Pgmq,
}

/// Selects the durable store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

/// Queue service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue-name prefix for this deployment
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Cloud region identifier, informational for managed deployments
    #[serde(default)]
    pub region: Option<String>,
    /// Cloud account identifier, informational for managed deployments
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub backend: QueueBackend,
    /// Connection string for the pgmq backend
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            region: None,
            account_id: None,
            backend: QueueBackend::Memory,
            database_url: None,
        }
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Connection string for the postgres backend
    #[serde(default)]
    pub database_url: Option<String>,
}

/// Ownership freshness windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipConfig {
    /// A record is owning while its heartbeat is within this window
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,
    /// The reaper flips active records older than this to inactive
    #[serde(default = "default_hard_stale_secs")]
    pub hard_stale_secs: u64,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            freshness_secs: default_freshness_secs(),
            hard_stale_secs: default_hard_stale_secs(),
        }
    }
}

impl OwnershipConfig {
    pub fn freshness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_secs as i64)
    }

    pub fn hard_stale(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.hard_stale_secs as i64)
    }
}

/// Correlator timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Default deadline for a submitted command
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Long-poll wait per receive against an output queue
    #[serde(default = "default_poll_wait_secs")]
    pub poll_wait_secs: u64,
    /// Max messages per receive batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Deadline check cadence on each tenant loop
    #[serde(default = "default_deadline_tick_secs")]
    pub deadline_tick_secs: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            poll_wait_secs: default_poll_wait_secs(),
            batch_size: default_batch_size(),
            deadline_tick_secs: default_deadline_tick_secs(),
        }
    }
}

impl CorrelationConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn poll_wait(&self) -> Duration {
        Duration::from_secs(self.poll_wait_secs)
    }

    pub fn deadline_tick(&self) -> Duration {
        Duration::from_secs(self.deadline_tick_secs)
    }
}

/// Reaper schedule and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    #[serde(default = "default_reaper_interval_secs")]
    pub interval_secs: u64,
    /// Queues older than this with no active owner get deleted
    #[serde(default = "default_orphan_age_secs")]
    pub orphan_age_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reaper_interval_secs(),
            orphan_age_secs: default_orphan_age_secs(),
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn orphan_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.orphan_age_secs as i64)
    }
}

/// Circuit breaker thresholds for the messaging client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            success_threshold: default_success_threshold(),
        }
    }
}

/// One row of the static tenant-config table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfigEntry {
    /// Sender identity: email address, phone number, or chat user id
    pub identity: String,
    pub project_id: String,
    pub user_id: String,
    #[serde(default)]
    pub repo_url: Option<String>,
}

/// Top-level configuration value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HermesConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ownership: OwnershipConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Static tenant-config table
    #[serde(default)]
    pub tenants: Vec<TenantConfigEntry>,
}

impl HermesConfig {
    /// Load from the default file (`hermes.toml`, optional) and environment
    pub fn load() -> HermesResult<Self> {
        Self::load_from("hermes")
    }

    /// Load from a named file base (without extension) and environment
    pub fn load_from(file_base: &str) -> HermesResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(file_base).required(false))
            .add_source(
                config::Environment::with_prefix("HERMES")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| HermesError::Configuration(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| HermesError::Configuration(e.to_string()))
    }

    /// Build the identity → (tenant, repo) lookup for the resolver
    pub fn tenant_table(&self) -> HermesResult<HashMap<String, (TenantKey, Option<String>)>> {
        let mut table = HashMap::with_capacity(self.tenants.len());
        for entry in &self.tenants {
            let tenant = TenantKey::new(&entry.project_id, &entry.user_id)?;
            table.insert(entry.identity.clone(), (tenant, entry.repo_url.clone()));
        }
        Ok(table)
    }

    /// Repo URL for a tenant, regardless of which identity mapped to it
    pub fn repo_url_for(&self, tenant: &TenantKey) -> Option<String> {
        self.tenants
            .iter()
            .find(|e| e.project_id == tenant.project_id && e.user_id == tenant.user_id)
            .and_then(|e| e.repo_url.clone())
    }
}

fn default_prefix() -> String {
    DEFAULT_QUEUE_PREFIX.to_string()
}

fn default_freshness_secs() -> u64 {
    300 // 5 minutes
}

fn default_hard_stale_secs() -> u64 {
    1800 // 30 minutes
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_poll_wait_secs() -> u64 {
    5
}

fn default_batch_size() -> usize {
    10
}

fn default_deadline_tick_secs() -> u64 {
    2
}

fn default_reaper_interval_secs() -> u64 {
    21_600 // 6 hours
}

fn default_orphan_age_secs() -> u64 {
    86_400 // 24 hours
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    30
}

fn default_success_threshold() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HermesConfig::default();
        assert_eq!(config.queue.prefix, "webordinary");
        assert_eq!(config.ownership.freshness_secs, 300);
        assert_eq!(config.ownership.hard_stale_secs, 1800);
        assert_eq!(config.correlation.default_timeout_secs, 300);
        assert_eq!(config.correlation.poll_wait_secs, 5);
        assert_eq!(config.correlation.batch_size, 10);
        assert_eq!(config.reaper.interval_secs, 21_600);
        assert_eq!(config.reaper.orphan_age_secs, 86_400);
        assert_eq!(config.queue.backend, QueueBackend::Memory);
    }

    #[test]
    fn test_tenant_table_lookup() {
        let config = HermesConfig {
            tenants: vec![TenantConfigEntry {
                identity: "escottster@gmail.com".to_string(),
                project_id: "amelia".to_string(),
                user_id: "scott".to_string(),
                repo_url: Some("https://github.com/webordinary/amelia-site.git".to_string()),
            }],
            ..Default::default()
        };
        let table = config.tenant_table().unwrap();
        let (tenant, repo) = table.get("escottster@gmail.com").unwrap();
        assert_eq!(tenant.canonical(), "amelia#scott");
        assert!(repo.is_some());

        assert_eq!(
            config.repo_url_for(&TenantKey::new("amelia", "scott").unwrap()),
            repo.clone()
        );
        assert!(config
            .repo_url_for(&TenantKey::new("nobody", "here").unwrap())
            .is_none());
    }

    #[test]
    fn test_tenant_table_rejects_invalid_ids() {
        let config = HermesConfig {
            tenants: vec![TenantConfigEntry {
                identity: "x@y.z".to_string(),
                project_id: "bad id".to_string(),
                user_id: "scott".to_string(),
                repo_url: None,
            }],
            ..Default::default()
        };
        assert!(config.tenant_table().is_err());
    }

    #[test]
    fn test_config_from_toml_fragment() {
        let parsed: HermesConfig = toml_fragment(
            r#"
            [queue]
            prefix = "staging"
            backend = "memory"

            [ownership]
            freshness_secs = 120

            [[tenants]]
            identity = "+15550001111"
            project_id = "amelia"
            user_id = "scott"
            "#,
        );
        assert_eq!(parsed.queue.prefix, "staging");
        assert_eq!(parsed.ownership.freshness_secs, 120);
        assert_eq!(parsed.ownership.hard_stale_secs, 1800);
        assert_eq!(parsed.tenants.len(), 1);
    }

    fn toml_fragment(raw: &str) -> HermesConfig {
        config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }
}
