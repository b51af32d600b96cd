//! # Queue Naming
//!
//! Queue name resolution for the tenant triplet scheme. Separates name
//! generation from messaging operations so alternate deployments can carry
//! their own prefix without touching the registry.
//!
//! Scheme:
//! - Input:  `{prefix}-input-{projectId}-{userId}`
//! - Output: `{prefix}-output-{projectId}-{userId}`
//! - DLQ:    `{prefix}-dlq-{projectId}-{userId}`
//! - Shared: `{prefix}-unclaimed`
//!
//! Tenant components are sanitized to `[A-Za-z0-9-]` before substitution.

use crate::messaging::MessagingError;
use crate::types::tenant::sanitize_component;
use crate::types::TenantKey;

/// Default queue-name prefix for the hosted platform
pub const DEFAULT_QUEUE_PREFIX: &str = "webordinary";

/// Queue names may not exceed this length (SQS-compatible limit)
const MAX_QUEUE_NAME_LEN: usize = 80;

/// Role a queue plays inside a tenant triplet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRole {
    Input,
    Output,
    Dlq,
}

impl QueueRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Dlq => "dlq",
        }
    }
}

/// Validate a constructed queue name against the allowed alphabet and length
pub fn validate_queue_name(name: &str) -> Result<(), MessagingError> {
    if name.is_empty() {
        return Err(MessagingError::invalid_queue_name(name, "empty name"));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(MessagingError::invalid_queue_name(
            name,
            format!("exceeds {MAX_QUEUE_NAME_LEN} characters"),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(MessagingError::invalid_queue_name(
            name,
            "characters outside [A-Za-z0-9-]",
        ));
    }
    Ok(())
}

/// Tenant-triplet queue naming trait
pub trait QueueNamer: Send + Sync {
    /// Name for one role of a tenant's triplet
    fn tenant_queue(&self, tenant: &TenantKey, role: QueueRole) -> Result<String, MessagingError>;

    /// The singleton shared unclaimed queue
    fn unclaimed_queue(&self) -> String;

    /// Recover `(role, tenant)` from a queue name produced by this scheme
    ///
    /// Returns `None` for names outside the scheme (including the unclaimed
    /// queue). The inverse is best-effort: tenants whose ids contain `-`
    /// cannot be split unambiguously and parse with the first segment as
    /// project id.
    fn parse_queue_name(&self, name: &str) -> Option<(QueueRole, TenantKey)>;

    /// Prefix used to enumerate queues this scheme manages
    fn managed_prefix(&self) -> String;
}

/// Default naming scheme with a configurable prefix
#[derive(Debug, Clone)]
pub struct DefaultQueueNamer {
    prefix: String,
}

impl DefaultQueueNamer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for DefaultQueueNamer {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_PREFIX)
    }
}

impl QueueNamer for DefaultQueueNamer {
    fn tenant_queue(&self, tenant: &TenantKey, role: QueueRole) -> Result<String, MessagingError> {
        let name = format!(
            "{}-{}-{}-{}",
            self.prefix,
            role.as_str(),
            sanitize_component(&tenant.project_id),
            sanitize_component(&tenant.user_id),
        );
        validate_queue_name(&name)?;
        Ok(name)
    }

    fn unclaimed_queue(&self) -> String {
        format!("{}-unclaimed", self.prefix)
    }

    fn parse_queue_name(&self, name: &str) -> Option<(QueueRole, TenantKey)> {
        let rest = name.strip_prefix(&format!("{}-", self.prefix))?;
        let (role, rest) = if let Some(r) = rest.strip_prefix("input-") {
            (QueueRole::Input, r)
        } else if let Some(r) = rest.strip_prefix("output-") {
            (QueueRole::Output, r)
        } else if let Some(r) = rest.strip_prefix("dlq-") {
            (QueueRole::Dlq, r)
        } else {
            return None;
        };

        let (project, user) = rest.split_once('-')?;
        let tenant = TenantKey::new(project, user).ok()?;
        Some((role, tenant))
    }

    fn managed_prefix(&self) -> String {
        format!("{}-", self.prefix)
    }
}

/// Enum dispatch for QueueNamer
///
/// Keeps the messaging layer free of trait objects, matching the provider
/// enums.
#[derive(Debug, Clone)]
pub enum QueueNamerKind {
    Default(DefaultQueueNamer),
}

impl QueueNamerKind {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::Default(DefaultQueueNamer::new(prefix))
    }

    pub fn tenant_queue(
        &self,
        tenant: &TenantKey,
        role: QueueRole,
    ) -> Result<String, MessagingError> {
        match self {
            Self::Default(n) => n.tenant_queue(tenant, role),
        }
    }

    pub fn unclaimed_queue(&self) -> String {
        match self {
            Self::Default(n) => n.unclaimed_queue(),
        }
    }

    pub fn parse_queue_name(&self, name: &str) -> Option<(QueueRole, TenantKey)> {
        match self {
            Self::Default(n) => n.parse_queue_name(name),
        }
    }

    pub fn managed_prefix(&self) -> String {
        match self {
            Self::Default(n) => n.managed_prefix(),
        }
    }
}

impl Default for QueueNamerKind {
    fn default() -> Self {
        Self::Default(DefaultQueueNamer::default())
    }
}
