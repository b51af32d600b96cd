//! # Tenant Resolver
//!
//! Maps an ingress message to its `(projectId, userId)` pair. Resolution
//! consults, in order: the session index, the thread-mapping table, and the
//! static tenant-config table keyed by sender identity. Messages no step
//! can place resolve to the reserved `("default", "unknown")` key and are
//! flagged unresolved.
//!
//! The repo URL always comes from the tenant-config table, regardless of
//! which step resolved the tenant; its absence flags missing configuration
//! rather than failing the route.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use hermes_shared::config::HermesConfig;
use hermes_shared::storage::StorageProvider;
use hermes_shared::types::{IngressMessage, TenantKey, ThreadId};
use hermes_shared::HermesResult;

/// Which lookup placed the tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedVia {
    Session,
    ThreadMapping,
    TenantConfig,
    Fallback,
}

/// Resolution result handed to the router
#[derive(Debug, Clone)]
pub struct ResolvedTenant {
    pub tenant: TenantKey,
    pub repo_url: Option<String>,
    pub via: ResolvedVia,
    /// True when no lookup matched and the reserved key was emitted
    pub unresolved: bool,
}

/// Resolver over the session index, thread mappings, and static config
#[derive(Debug, Clone)]
pub struct TenantResolver {
    storage: Arc<StorageProvider>,
    /// identity → (tenant, repo)
    identities: HashMap<String, (TenantKey, Option<String>)>,
    /// tenant canonical → repo, for tenants resolved via session or thread
    repos: HashMap<String, Option<String>>,
}

impl TenantResolver {
    pub fn new(storage: Arc<StorageProvider>, config: &HermesConfig) -> HermesResult<Self> {
        let identities = config.tenant_table()?;
        let repos = identities
            .values()
            .map(|(tenant, repo)| (tenant.canonical(), repo.clone()))
            .collect();
        Ok(Self {
            storage,
            identities,
            repos,
        })
    }

    /// Resolve the tenant for an ingress message whose thread id has
    /// already been extracted
    pub async fn resolve(
        &self,
        ingress: &IngressMessage,
        thread_id: &ThreadId,
    ) -> HermesResult<ResolvedTenant> {
        // 1. Session record, when the edge already established one
        if let Some(session_id) = ingress.session_id.as_deref().filter(|s| !s.is_empty()) {
            if let Some(record) = self.storage.session(session_id).await? {
                debug!(session_id, tenant = %record.tenant, "Tenant resolved via session index");
                return Ok(self.resolved(record.tenant, ResolvedVia::Session));
            }
        }

        // 2. Existing thread mapping
        if let Some(mapping) = self.storage.get_mapping(thread_id).await? {
            debug!(thread_id = %thread_id, tenant = %mapping.tenant, "Tenant resolved via thread mapping");
            return Ok(self.resolved(mapping.tenant, ResolvedVia::ThreadMapping));
        }

        // 3. Static tenant-config table by sender identity
        let identity = ingress.sender_identity();
        if let Some((tenant, repo)) = self.identities.get(identity) {
            debug!(identity, tenant = %tenant, "Tenant resolved via tenant-config table");
            return Ok(ResolvedTenant {
                tenant: tenant.clone(),
                repo_url: repo.clone(),
                via: ResolvedVia::TenantConfig,
                unresolved: false,
            });
        }

        // 4. Reserved fallback, marked unresolved
        warn!(
            identity,
            thread_id = %thread_id,
            "No tenant match; emitting reserved fallback key"
        );
        Ok(ResolvedTenant {
            tenant: TenantKey::fallback(),
            repo_url: None,
            via: ResolvedVia::Fallback,
            unresolved: true,
        })
    }

    fn resolved(&self, tenant: TenantKey, via: ResolvedVia) -> ResolvedTenant {
        let repo_url = self
            .repos
            .get(&tenant.canonical())
            .cloned()
            .unwrap_or(None);
        if repo_url.is_none() {
            debug!(tenant = %tenant, "Tenant has no repo URL configured");
        }
        ResolvedTenant {
            tenant,
            repo_url,
            via,
            unresolved: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hermes_shared::config::TenantConfigEntry;
    use hermes_shared::storage::SessionRecord;
    use hermes_shared::types::{EmailIngress, IngressPayload, ThreadMapping, Transport};

    fn config() -> HermesConfig {
        HermesConfig {
            tenants: vec![TenantConfigEntry {
                identity: "escottster@gmail.com".to_string(),
                project_id: "amelia".to_string(),
                user_id: "scott".to_string(),
                repo_url: Some("https://github.com/webordinary/amelia-site.git".to_string()),
            }],
            ..Default::default()
        }
    }

    fn ingress(from: &str, session_id: Option<&str>) -> IngressMessage {
        IngressMessage {
            payload: IngressPayload::Email(EmailIngress {
                from: from.to_string(),
                references: vec![],
                in_reply_to: None,
                message_id: "<m@x>".to_string(),
                subject: None,
                body: "update homepage".to_string(),
            }),
            session_id: session_id.map(String::from),
            thread_id_hint: None,
            raw: serde_json::Value::Null,
        }
    }

    fn resolver() -> (TenantResolver, Arc<StorageProvider>) {
        let storage = Arc::new(StorageProvider::new_memory());
        let resolver = TenantResolver::new(storage.clone(), &config()).unwrap();
        (resolver, storage)
    }

    #[tokio::test]
    async fn test_resolves_via_tenant_config() {
        let (resolver, _) = resolver();
        let resolved = resolver
            .resolve(&ingress("escottster@gmail.com", None), &ThreadId::new("t1"))
            .await
            .unwrap();
        assert_eq!(resolved.tenant.canonical(), "amelia#scott");
        assert_eq!(resolved.via, ResolvedVia::TenantConfig);
        assert!(resolved.repo_url.is_some());
        assert!(!resolved.unresolved);
    }

    #[tokio::test]
    async fn test_session_takes_precedence() {
        let (resolver, storage) = resolver();
        storage
            .put_session(&SessionRecord {
                session_id: "sess-1".to_string(),
                tenant: TenantKey::new("bob", "jones").unwrap(),
                thread_id: None,
                last_activity_at: Utc::now(),
            })
            .await
            .unwrap();

        let resolved = resolver
            .resolve(
                &ingress("escottster@gmail.com", Some("sess-1")),
                &ThreadId::new("t1"),
            )
            .await
            .unwrap();
        assert_eq!(resolved.tenant.canonical(), "bob#jones");
        assert_eq!(resolved.via, ResolvedVia::Session);
        // bob#jones has no tenant-config row, so no repo URL
        assert!(resolved.repo_url.is_none());
    }

    #[tokio::test]
    async fn test_thread_mapping_beats_identity() {
        let (resolver, storage) = resolver();
        storage
            .insert_mapping_if_absent(&ThreadMapping::new(
                ThreadId::new("t1"),
                TenantKey::new("carol", "smith").unwrap(),
                Transport::Email,
            ))
            .await
            .unwrap();

        let resolved = resolver
            .resolve(&ingress("escottster@gmail.com", None), &ThreadId::new("t1"))
            .await
            .unwrap();
        assert_eq!(resolved.tenant.canonical(), "carol#smith");
        assert_eq!(resolved.via, ResolvedVia::ThreadMapping);
    }

    #[tokio::test]
    async fn test_unknown_identity_falls_back() {
        let (resolver, _) = resolver();
        let resolved = resolver
            .resolve(&ingress("stranger@example.com", None), &ThreadId::new("t1"))
            .await
            .unwrap();
        assert!(resolved.tenant.is_fallback());
        assert_eq!(resolved.via, ResolvedVia::Fallback);
        assert!(resolved.unresolved);
    }

    #[tokio::test]
    async fn test_repo_lookup_for_session_resolved_tenant() {
        let (resolver, storage) = resolver();
        // Session maps to a tenant that *does* have a config row
        storage
            .put_session(&SessionRecord {
                session_id: "sess-2".to_string(),
                tenant: TenantKey::new("amelia", "scott").unwrap(),
                thread_id: None,
                last_activity_at: Utc::now(),
            })
            .await
            .unwrap();

        let resolved = resolver
            .resolve(
                &ingress("someone-else@example.com", Some("sess-2")),
                &ThreadId::new("t9"),
            )
            .await
            .unwrap();
        assert_eq!(resolved.via, ResolvedVia::Session);
        assert!(resolved.repo_url.is_some(), "repo comes from config table");
    }
}
