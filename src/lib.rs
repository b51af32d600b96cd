//! # Hermes Core
//!
//! Workspace root for the Hermes routing core. The implementation lives in
//! the workspace crates:
//!
//! - `hermes-shared`: domain types, wire formats, queue + store providers,
//!   configuration, resilience
//! - `hermes-routing`: the routing and correlation engine plus the server
//!   binary
//! - `hermes-ingress`: thin transport adapters
//!
//! This crate carries only the end-to-end scenario tests under `tests/`.
