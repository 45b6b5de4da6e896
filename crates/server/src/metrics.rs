//! Prometheus metrics
//!
//! The pipeline and servicer record through the `metrics` facade; this
//! module installs the Prometheus recorder rendered at `/metrics`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the process-wide Prometheus recorder.
///
/// Returns the render handle for the `/metrics` route, or `None` when a
/// recorder is already installed (tests install at most one per process).
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    }
}
