//! `/healthz` and `/debug/vars` handlers.

use axum::extract::State;
use axum::http::StatusCode;

use super::AppState;

/// Unconditional liveness check. Always `200 ok`, regardless of shutdown
/// state -- orchestrators use this to confirm the process is running, not
/// whether it is currently accepting new work.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Renders the current Prometheus-format metrics snapshot:
/// `api_key_issue_total`, `api_key_validation_total`, `temporary_keys_active`.
pub async fn debug_vars_handler(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}
