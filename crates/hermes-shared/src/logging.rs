//! # Logging Initialization
//!
//! Tracing setup shared by the server binary and integration harnesses.
//! `RUST_LOG` controls filtering; `HERMES_LOG_FORMAT=json` switches to
//! structured JSON output for log aggregation.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hermes_shared=info,hermes_routing=info"));

    let json = std::env::var("HERMES_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).try_init()
    };

    // Already initialized (tests call this repeatedly)
    let _ = result;
}
