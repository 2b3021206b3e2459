//! Prometheus metrics export.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Install the Prometheus recorder with an HTTP scrape listener.
/// Must run inside the Tokio runtime (the exporter spawns its listener
/// there).
pub fn init_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus recorder")?;
    info!("metrics listening on http://{}/metrics", addr);
    initialize_engine_metrics();
    Ok(())
}

/// Touch every counter the engine increments so they are visible to the
/// first scrape, before any events occur.
pub fn initialize_engine_metrics() {
    metrics::counter!("skywatch.feed.snapshots_total").absolute(0);
    metrics::counter!("skywatch.feed.duplicates_total").absolute(0);
    metrics::counter!("skywatch.feed.errors_total").absolute(0);
    metrics::counter!("skywatch.alerts.inserted_total").absolute(0);
    metrics::counter!("skywatch.alerts.removed_total").absolute(0);
    metrics::counter!("skywatch.delivery.faults_total").absolute(0);
    metrics::counter!("skywatch.pipeline.truncated_ticks_total").absolute(0);
    metrics::gauge!("skywatch.aircraft.tracked").set(0.0);
    metrics::gauge!("skywatch.alerts.active").set(0.0);
}
