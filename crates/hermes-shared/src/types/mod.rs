//! # Domain Types
//!
//! Core value types shared across the routing engine: tenant keys, thread
//! identifiers and mappings, and the tagged ingress message consumed by the
//! extractor and resolver.

pub mod ingress;
pub mod tenant;
pub mod thread;

pub use ingress::{ChatIngress, EmailIngress, IngressMessage, IngressPayload, SmsIngress, Transport};
pub use tenant::TenantKey;
pub use thread::{ThreadId, ThreadMapping};
