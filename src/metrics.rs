//! Prometheus metrics for nodeline.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`
//! with its own HTTP listener, and defines the metric name constants used
//! across the crate.  When no recorder is installed (tests, or metrics
//! disabled in config) every `metrics` macro is a no-op.

use std::net::SocketAddr;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

// -- Metric name constants ----------------------------------------------------

/// Accepted connections (counter).
pub const CONNECTIONS_TOTAL: &str = "nodeline_connections_total";

/// Currently open connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "nodeline_connections_active";

/// Dispatched commands (counter). Labels: verb.
pub const COMMANDS_TOTAL: &str = "nodeline_commands_total";

/// Dispatch duration in seconds (histogram). Labels: verb.
pub const DISPATCH_DURATION_SECONDS: &str = "nodeline_dispatch_duration_seconds";

/// Registry save attempts (counter). Labels: status.
pub const REGISTRY_SAVES_TOTAL: &str = "nodeline_registry_saves_total";

/// Nodes held by the registry (gauge).
pub const REGISTRY_NODES: &str = "nodeline_registry_nodes";

// -- Global recorder installation ---------------------------------------------

/// Install the global Prometheus recorder and start its scrape listener on
/// `listen`.  Must be called from inside the tokio runtime.
pub fn init_metrics(listen: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()?;
    describe_metrics();
    Ok(())
}

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(CONNECTIONS_TOTAL, "Total accepted connections");
    describe_gauge!(CONNECTIONS_ACTIVE, "Currently open connections");
    describe_counter!(COMMANDS_TOTAL, "Total dispatched commands by verb");
    describe_histogram!(
        DISPATCH_DURATION_SECONDS,
        "Command dispatch duration in seconds"
    );
    describe_counter!(REGISTRY_SAVES_TOTAL, "Registry save attempts by outcome");
    describe_gauge!(REGISTRY_NODES, "Nodes currently held by the registry");
}
