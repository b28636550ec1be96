//! Prometheus metrics for upstream traffic.
//!
//! Uses the `metrics` facade with the Prometheus exporter installed once per
//! process. The recorder is process-global; when it is not installed (library
//! tests, CLI runs) every recording macro is a no-op, so call sites never need
//! to guard.
//!
//! Metric names follow the gateway's operational vocabulary:
//!
//! | Metric | Type | Labels |
//! |---|---|---|
//! | `rpc_forward_calls_total` | counter | `chain`, `url` |
//! | `rpc_forward_call_duration_seconds` | histogram | `chain`, `url` |
//! | `rpc_call_errors_total` | counter | `chain`, `url`, `kind` |
//! | `rpc_latest_block_height` | gauge | `chain`, `url` |
//!
//! The error counter is labelled with a bounded error *kind* rather than the
//! full error text, keeping label cardinality finite.

use std::{sync::OnceLock, time::Duration};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the process-wide Prometheus recorder and returns its handle.
///
/// Safe to call more than once; subsequent calls return the handle installed
/// by the first.
pub fn install_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("install prometheus recorder (no other recorder may be installed)")
        })
        .clone()
}

/// Renders the current exposition text, or an empty string when no recorder
/// has been installed.
#[must_use]
pub fn render() -> String {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}

/// Records one successful upstream forward and its latency.
pub fn record_forward_call(chain_id: u64, url: &str, elapsed: Duration) {
    counter!(
        "rpc_forward_calls_total",
        "chain" => chain_id.to_string(),
        "url" => url.to_string()
    )
    .increment(1);
    histogram!(
        "rpc_forward_call_duration_seconds",
        "chain" => chain_id.to_string(),
        "url" => url.to_string()
    )
    .record(elapsed.as_secs_f64());
}

/// Records one failed upstream call, labelled by error kind.
pub fn record_call_error(chain_id: u64, url: &str, kind: &'static str) {
    counter!(
        "rpc_call_errors_total",
        "chain" => chain_id.to_string(),
        "url" => url.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Records the chain head observed by a successful health probe.
#[allow(clippy::cast_precision_loss)]
pub fn record_block_height(chain_id: u64, url: &str, height: u64) {
    gauge!(
        "rpc_latest_block_height",
        "chain" => chain_id.to_string(),
        "url" => url.to_string()
    )
    .set(height as f64);
}
