//! Metrics export for the Thermosync server.
//!
//! The hub records its own metrics through the `metrics` facade; this module
//! adds the HTTP-side ones and installs the Prometheus exporter.

use anyhow::{Context, Result};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const UPGRADES_TOTAL: &str = "thermosync_ws_upgrades_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    thermosync_core::metrics::describe_metrics();
    metrics::describe_counter!(
        names::UPGRADES_TOTAL,
        "WebSocket upgrades handed to the hub, by outcome"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record the outcome of handing an upgraded socket to the hub.
pub fn record_upgrade(outcome: &'static str) {
    counter!(names::UPGRADES_TOTAL, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_recorder() {
        // no recorder installed: recording is a no-op
        init_metrics();
        record_upgrade("accepted");
    }
}
