//! Metrics surface: issue/validation counters and the active-keys gauge.
//!
//! Installed once at startup via [`install_recorder`], which mounts a
//! Prometheus-style recorder via the `metrics` + `metrics-exporter-prometheus`
//! stack. `/debug/vars` renders the handle's current snapshot in Prometheus
//! text exposition format. Labels carry only hashed identifiers; raw keys
//! and raw operator values never reach a metric label.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the process-wide Prometheus recorder and returns its handle.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

/// Increments `api_key_issue_total{result,operator}`.
pub fn record_issue(result: &str, operator_hash: &str) {
    counter!(
        "api_key_issue_total",
        "result" => result.to_string(),
        "operator" => operator_hash.to_string(),
    )
    .increment(1);
}

/// Increments `api_key_validation_total{outcome}`.
pub fn record_validation(outcome: &str) {
    counter!("api_key_validation_total", "outcome" => outcome.to_string()).increment(1);
}

/// Sets the `temporary_keys_active` gauge.
pub fn set_active_keys(count: f64) {
    gauge!("temporary_keys_active").set(count);
}
