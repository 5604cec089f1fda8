use std::net::SocketAddr;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics for scraping
pub fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

/// Initialize tracker metrics to zero so they show up in Prometheus queries
/// before the first event
pub fn initialize_tracker_metrics() {
    // TNC connection
    metrics::counter!("kiss.connection.established_total").absolute(0);
    metrics::counter!("kiss.connection.failed_total").absolute(0);
    metrics::gauge!("kiss.connection.connected").set(0.0);
    metrics::counter!("kiss.bytes_received_total").absolute(0);
    metrics::counter!("kiss.frames_received_total").absolute(0);
    metrics::counter!("kiss.frames_ignored_total").absolute(0);

    // Ingest pipeline
    metrics::counter!("tracker.frames_rejected_total").absolute(0);
    metrics::counter!("tracker.positions_missing_total").absolute(0);
    metrics::counter!("tracker.upserts_total").absolute(0);
    metrics::counter!("tracker.upsert_failures_total").absolute(0);
    metrics::counter!("tracker.history_pruned_total").absolute(0);
    metrics::gauge!("tracker.stations").set(0.0);
    metrics::gauge!("tracker.stations_with_position").set(0.0);

    // Fan-out
    metrics::gauge!("broadcaster.subscribers").set(0.0);
    metrics::counter!("broadcaster.subscribers_removed_total").absolute(0);
}

/// Serve `/metrics` on `port` until the server fails
pub async fn start_metrics_server(port: u16) -> Result<()> {
    let handle = init_metrics()?;
    initialize_tracker_metrics();

    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting metrics server on http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server on {addr}"))?;

    axum::serve(listener, app)
        .await
        .context("Metrics server failed")
}
