//! # Tenant Keys
//!
//! The `(projectId, userId)` pair is the unit of ownership, queue
//! allocation, and git branch family. Both halves are restricted to
//! `[A-Za-z0-9-]+`; the canonical string form joins them with `#`, the
//! sanitized form (used in queue names) with `-`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{HermesError, HermesResult};

/// Reserved project id for messages no resolver step could place
pub const FALLBACK_PROJECT_ID: &str = "default";

/// Reserved user id for messages no resolver step could place
pub const FALLBACK_USER_ID: &str = "unknown";

/// The `(projectId, userId)` pair identifying a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantKey {
    pub project_id: String,
    pub user_id: String,
}

impl TenantKey {
    /// Build a tenant key, validating both halves against `[A-Za-z0-9-]+`
    pub fn new(project_id: impl Into<String>, user_id: impl Into<String>) -> HermesResult<Self> {
        let project_id = project_id.into();
        let user_id = user_id.into();

        validate_component("projectId", &project_id)?;
        validate_component("userId", &user_id)?;

        Ok(Self {
            project_id,
            user_id,
        })
    }

    /// The reserved `("default", "unknown")` key for unresolved messages
    pub fn fallback() -> Self {
        Self {
            project_id: FALLBACK_PROJECT_ID.to_string(),
            user_id: FALLBACK_USER_ID.to_string(),
        }
    }

    /// True for the reserved unresolved-tenant key
    pub fn is_fallback(&self) -> bool {
        self.project_id == FALLBACK_PROJECT_ID && self.user_id == FALLBACK_USER_ID
    }

    /// Canonical string form: `projectId#userId`
    pub fn canonical(&self) -> String {
        format!("{}#{}", self.project_id, self.user_id)
    }

    /// Sanitized form for queue names: `projectId-userId`
    pub fn sanitized(&self) -> String {
        format!(
            "{}-{}",
            sanitize_component(&self.project_id),
            sanitize_component(&self.user_id)
        )
    }

    /// Parse the canonical `projectId#userId` form
    pub fn parse_canonical(raw: &str) -> HermesResult<Self> {
        let (project, user) = raw.split_once('#').ok_or_else(|| {
            HermesError::Validation(format!("Tenant key missing '#' separator: {raw}"))
        })?;
        Self::new(project, user)
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.project_id, self.user_id)
    }
}

fn validate_component(field: &str, value: &str) -> HermesResult<()> {
    if value.is_empty() {
        return Err(HermesError::Validation(format!("{field} must be non-empty")));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(HermesError::Validation(format!(
            "{field} contains characters outside [A-Za-z0-9-]: {value}"
        )));
    }
    Ok(())
}

/// Replace any character outside `[A-Za-z0-9-]` with `-`
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tenant_key() {
        let key = TenantKey::new("amelia", "scott").unwrap();
        assert_eq!(key.canonical(), "amelia#scott");
        assert_eq!(key.sanitized(), "amelia-scott");
    }

    #[test]
    fn test_rejects_empty_components() {
        assert!(TenantKey::new("", "scott").is_err());
        assert!(TenantKey::new("amelia", "").is_err());
    }

    #[test]
    fn test_rejects_invalid_characters() {
        assert!(TenantKey::new("amelia site", "scott").is_err());
        assert!(TenantKey::new("amelia", "scott@example").is_err());
        assert!(TenantKey::new("amelia#x", "scott").is_err());
    }

    #[test]
    fn test_parse_canonical_roundtrip() {
        let key = TenantKey::new("proj-1", "user-2").unwrap();
        let parsed = TenantKey::parse_canonical(&key.canonical()).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_parse_canonical_missing_separator() {
        assert!(TenantKey::parse_canonical("no-separator").is_err());
    }

    #[test]
    fn test_fallback_key() {
        let key = TenantKey::fallback();
        assert!(key.is_fallback());
        assert_eq!(key.canonical(), "default#unknown");
        assert!(!TenantKey::new("amelia", "scott").unwrap().is_fallback());
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("a_b.c"), "a-b-c");
        assert_eq!(sanitize_component("clean-name"), "clean-name");
    }
}
