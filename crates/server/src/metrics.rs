//! Prometheus metrics (spec's ambient observability stack): a
//! process-global recorder installed once at startup, scraped by a plain
//! `/metrics` handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the global Prometheus recorder. Must be called exactly once,
/// before any `metrics::counter!`/`histogram!` call fires.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new().install_recorder().expect("failed to install Prometheus recorder");
    let _ = HANDLE.set(handle.clone());
    handle
}

pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}
