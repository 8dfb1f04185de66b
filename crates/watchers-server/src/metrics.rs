//! Prometheus recorder and metric names.

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Viewer connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Viewer disconnections (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open viewer sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused (counter, labels: reason).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Broadcast sends skipped because the viewer was not writable (counter).
pub const WS_BROADCAST_SKIPS_TOTAL: &str = "ws_broadcast_skips_total";
/// Viewer session lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Products with at least one watcher (gauge).
pub const WATCHERS_ACTIVE_PRODUCTS: &str = "watchers_active_products";

/// Product page visits run from a bounce to a long read.
const SESSION_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0];

/// Recorder builder with session-length buckets.
pub fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full(WS_CONNECTION_DURATION_SECONDS.to_owned()),
        SESSION_BUCKETS,
    )
}

/// Install the global recorder and describe every metric.
///
/// Call once at startup; a second install fails.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = builder()?.install_recorder()?;
    describe();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render the `/metrics` body.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

fn describe() {
    describe_counter!(WS_CONNECTIONS_TOTAL, "Viewer connections accepted");
    describe_counter!(WS_DISCONNECTIONS_TOTAL, "Viewer connections closed");
    describe_gauge!(WS_CONNECTIONS_ACTIVE, "Open viewer sessions");
    describe_counter!(WS_CONNECTIONS_REJECTED_TOTAL, "Viewer upgrades refused");
    describe_counter!(WS_BROADCAST_SKIPS_TOTAL, "Count updates skipped for unwritable viewers");
    describe_histogram!(WS_CONNECTION_DURATION_SECONDS, Unit::Seconds, "Viewer session lifetime");
    describe_gauge!(WATCHERS_ACTIVE_PRODUCTS, "Products with at least one watcher");
}
