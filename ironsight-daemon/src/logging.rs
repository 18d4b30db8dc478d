//! Logging initialization for ironsight-daemon.
//!
//! Intentionally minimal: one fmt subscriber, env-filtered, in JSON or
//! pretty form. The only daemon-specific piece is the default filter,
//! which keeps the DNS and HTTP backends at `warn` -- hickory and
//! reqwest trace every lookup and request, and an enumeration issues
//! thousands of both.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use ironsight_core::config::GeneralConfig;

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
/// `RUST_LOG` takes precedence; otherwise `[general].log_level` applies
/// with the backend crates capped at `warn`.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hickory_resolver=warn,hickory_proto=warn,reqwest=warn",
            config.log_level
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format.as_str() {
        "json" => builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e)),
        "pretty" => builder
            .pretty()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e)),
        other => Err(anyhow::anyhow!(
            "unknown log format '{}', expected 'json' or 'pretty'",
            other
        )),
    }
}
