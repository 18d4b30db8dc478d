//! Prometheus metrics endpoint.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`
//! to expose a scrape endpoint on localhost when `[metrics]` is enabled.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

use ironsight_core::config::MetricsConfig;

/// Install the global metrics recorder and start the HTTP listener.
///
/// Should be called once per process, before any services start.
/// After calling this, all `metrics::counter!()` / `metrics::gauge!()`
/// macros record to the Prometheus registry.
///
/// # Errors
///
/// Fails if the socket cannot be bound or a global recorder is already
/// installed.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr: SocketAddr = ([127, 0, 0, 1], config.port).into();

    tracing::info!(listen_addr = %addr, "installing Prometheus metrics recorder");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    ironsight_core::metrics::describe_all();
    Ok(())
}
