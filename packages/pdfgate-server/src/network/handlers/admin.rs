//! Admin key-management endpoints: issue, inspect, revoke, cleanup.
//!
//! All bodies are JSON; all responses carry `{"error": "..."}` on failure.
//! `not found` is returned uniformly for unknown keys to avoid key
//! enumeration -- see the fallback handler in `NetworkModule` for the
//! unknown-path/method case.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pdfgate_core::{KeyRecord, RepoError};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::apikey::KeyService;
use crate::middleware::AdminIdentity;

const DEFAULT_USAGE_LIMIT: u32 = 10;
const MIN_USAGE_LIMIT: u32 = 1;
const MAX_USAGE_LIMIT: u32 = 1_000;

const DEFAULT_TTL_MINUTES: i64 = 10_080;
const MIN_TTL_MINUTES: i64 = 15;
const MAX_TTL_MINUTES: i64 = 10_080;

const DEFAULT_CLEANUP_LIMIT: i64 = 200;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IssueKeyRequest {
    pub label: Option<String>,
    pub usage_limit: Option<u32>,
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueKeyResponse {
    key: String,
    label: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    max_usage: u32,
    remaining_usage: u32,
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyMetadata {
    label: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    max_usage: u32,
    remaining_usage: u32,
    status: &'static str,
    revoked_at: Option<DateTime<Utc>>,
}

impl KeyMetadata {
    fn from_record(record: &KeyRecord, now: DateTime<Utc>) -> Self {
        Self {
            label: record.label.clone(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            max_usage: record.max_usage,
            remaining_usage: record.remaining_usage,
            status: record.status(now).as_str(),
            revoked_at: record.revoked_at,
        }
    }
}

/// `POST /admin/api-keys`.
pub async fn issue_key_handler(
    State(state): State<AppState>,
    Extension(operator): Extension<AdminIdentity>,
    Json(body): Json<IssueKeyRequest>,
) -> Response {
    let Some(service) = feature_gate(&state) else {
        return disabled_response();
    };

    let usage_limit = body.usage_limit.unwrap_or(DEFAULT_USAGE_LIMIT);
    if !(MIN_USAGE_LIMIT..=MAX_USAGE_LIMIT).contains(&usage_limit) {
        return bad_request("usageLimit must be between 1 and 1000");
    }

    let ttl_minutes = body.ttl_minutes.unwrap_or(DEFAULT_TTL_MINUTES);
    if !(MIN_TTL_MINUTES..=MAX_TTL_MINUTES).contains(&ttl_minutes) {
        return bad_request("ttlMinutes must be between 15 and 10080");
    }

    let label = body.label.unwrap_or_default();
    let ttl = ChronoDuration::minutes(ttl_minutes);

    match service
        .issue_temporary_key(label, usage_limit, ttl, &operator.operator)
        .await
    {
        Ok(record) => {
            let response = IssueKeyResponse {
                key: record.key,
                label: record.label,
                created_at: record.created_at,
                expires_at: record.expires_at,
                max_usage: record.max_usage,
                remaining_usage: record.remaining_usage,
                status: "active",
            };
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(_err) => service_unavailable(),
    }
}

/// `GET /admin/api-keys/{key}`.
pub async fn get_key_handler(
    State(state): State<AppState>,
    Extension(_operator): Extension<AdminIdentity>,
    Path(key): Path<String>,
) -> Response {
    let Some(service) = feature_gate(&state) else {
        return disabled_response();
    };

    match service.get(&key).await {
        Ok(record) => Json(KeyMetadata::from_record(&record, Utc::now())).into_response(),
        Err(RepoError::NotFound) => not_found(),
        Err(_) => service_unavailable(),
    }
}

/// `POST /admin/api-keys/{key}/revoke`.
pub async fn revoke_key_handler(
    State(state): State<AppState>,
    Extension(operator): Extension<AdminIdentity>,
    Path(key): Path<String>,
) -> Response {
    let Some(service) = feature_gate(&state) else {
        return disabled_response();
    };

    match service.revoke(&key, &operator.operator).await {
        Ok(record) => Json(KeyMetadata::from_record(&record, Utc::now())).into_response(),
        Err(RepoError::NotFound) => not_found(),
        Err(_) => service_unavailable(),
    }
}

/// `POST /admin/api-keys/cleanup?limit=N`.
pub async fn cleanup_handler(
    State(state): State<AppState>,
    Extension(_operator): Extension<AdminIdentity>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(service) = feature_gate(&state) else {
        return disabled_response();
    };

    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|&l| l >= 1)
        .unwrap_or(DEFAULT_CLEANUP_LIMIT)
        .min(DEFAULT_CLEANUP_LIMIT);

    match service.cleanup_expired(limit).await {
        Ok(deleted) => Json(json!({ "deleted": deleted })).into_response(),
        Err(_) => service_unavailable(),
    }
}

fn feature_gate(state: &AppState) -> Option<Arc<KeyService>> {
    state.key_service.clone()
}

fn disabled_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "temporary key management disabled" })),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
}

fn service_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "service unavailable" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apikey::memory_store::MemoryRepository;
    use axum::body::{to_bytes, Body};
    use pdfgate_core::SystemClock;

    fn operator() -> AdminIdentity {
        AdminIdentity {
            operator: "op-key".to_string(),
        }
    }

    fn state_with(key_service: Option<Arc<KeyService>>) -> AppState {
        let (_recorder, handle) = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build()
            .unwrap();
        AppState {
            shutdown: Arc::new(crate::network::ShutdownController::new()),
            config: Arc::new(crate::network::NetworkConfig::default()),
            start_time: std::time::Instant::now(),
            key_service,
            metrics_handle: handle,
            document: Arc::new(super::convert::NullDocumentOpener),
        }
    }

    fn enabled_state() -> AppState {
        let repo = Arc::new(MemoryRepository::new()) as Arc<dyn crate::apikey::Repository>;
        let svc = Arc::new(KeyService::new(repo, Arc::new(SystemClock)));
        state_with(Some(svc))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn issue_defaults_are_applied() {
        let state = enabled_state();
        let response = issue_key_handler(
            State(state),
            Extension(operator()),
            Json(IssueKeyRequest::default()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["maxUsage"], 10);
        assert_eq!(body["remainingUsage"], 10);
    }

    #[tokio::test]
    async fn usage_limit_boundaries() {
        let state = enabled_state();
        for (limit, expect_created) in [(0u32, false), (1, true), (1000, true), (1001, false)] {
            let response = issue_key_handler(
                State(state.clone()),
                Extension(operator()),
                Json(IssueKeyRequest {
                    usage_limit: Some(limit),
                    ..Default::default()
                }),
            )
            .await;
            let expected = if expect_created {
                StatusCode::CREATED
            } else {
                StatusCode::BAD_REQUEST
            };
            assert_eq!(response.status(), expected, "limit={limit}");
        }
    }

    #[tokio::test]
    async fn ttl_minutes_boundaries() {
        let state = enabled_state();
        for (ttl, expect_created) in [(14i64, false), (15, true), (10080, true), (10081, false)] {
            let response = issue_key_handler(
                State(state.clone()),
                Extension(operator()),
                Json(IssueKeyRequest {
                    ttl_minutes: Some(ttl),
                    ..Default::default()
                }),
            )
            .await;
            let expected = if expect_created {
                StatusCode::CREATED
            } else {
                StatusCode::BAD_REQUEST
            };
            assert_eq!(response.status(), expected, "ttl={ttl}");
        }
    }

    #[tokio::test]
    async fn disabled_feature_returns_503_for_every_admin_op() {
        let state = state_with(None);

        let issue = issue_key_handler(
            State(state.clone()),
            Extension(operator()),
            Json(IssueKeyRequest::default()),
        )
        .await;
        assert_eq!(issue.status(), StatusCode::SERVICE_UNAVAILABLE);

        let get = get_key_handler(State(state.clone()), Extension(operator()), Path("k".into()))
            .await;
        assert_eq!(get.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn get_unknown_key_is_uniform_404() {
        let state = enabled_state();
        let response =
            get_key_handler(State(state), Extension(operator()), Path("missing".into())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "not found");
    }

    #[tokio::test]
    async fn revoke_unknown_key_is_404() {
        let state = enabled_state();
        let response = revoke_key_handler(
            State(state),
            Extension(operator()),
            Path("missing".into()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cleanup_clamps_large_limit_query_param() {
        let state = enabled_state();
        let mut params = HashMap::new();
        params.insert("limit".to_string(), "500".to_string());

        let response =
            cleanup_handler(State(state), Extension(operator()), Query(params)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["deleted"], 0);
    }

    #[tokio::test]
    async fn cleanup_falls_back_to_default_on_unparsable_limit() {
        let state = enabled_state();
        let mut params = HashMap::new();
        params.insert("limit".to_string(), "not-a-number".to_string());

        let response =
            cleanup_handler(State(state), Extension(operator()), Query(params)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn issue_then_get_round_trips() {
        let state = enabled_state();
        let issued = issue_key_handler(
            State(state.clone()),
            Extension(operator()),
            Json(IssueKeyRequest {
                label: Some("trial".to_string()),
                usage_limit: Some(2),
                ttl_minutes: Some(60),
            }),
        )
        .await;
        let issued_body = body_json(issued).await;
        let key = issued_body["key"].as_str().unwrap().to_string();

        let fetched = get_key_handler(State(state), Extension(operator()), Path(key)).await;
        assert_eq!(fetched.status(), StatusCode::OK);
        let fetched_body = body_json(fetched).await;
        assert_eq!(fetched_body["label"], "trial");
        assert_eq!(fetched_body["maxUsage"], 2);
        assert_eq!(fetched_body["status"], "active");
    }
}
