//! Front gate for `/convert`: extracts `X-API-Key`, checks the static set,
//! then falls through to [`KeyService::validate_and_consume`].

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use pdfgate_core::{KeyIdentityGen, ValidationOutcome};
use serde_json::json;
use tower::{Layer, Service};
use tracing::warn;

use crate::apikey::KeyService;

const API_KEY_HEADER: &str = "x-api-key";
const IDENTIFIER_HASH_PREFIX: usize = 16;
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Identity attached to the request extensions once a key has passed.
#[derive(Debug, Clone)]
pub struct ApiKeyIdentity {
    pub key: String,
}

struct ApiKeyConfig {
    static_keys: HashSet<String>,
    key_service: Option<Arc<KeyService>>,
    feature_enabled: bool,
    retry_after: Duration,
}

/// `Layer` wrapping a handler/router with API-key authorization.
#[derive(Clone)]
pub struct ApiKeyLayer {
    config: Arc<ApiKeyConfig>,
}

impl ApiKeyLayer {
    #[must_use]
    pub fn new(
        static_keys: HashSet<String>,
        key_service: Option<Arc<KeyService>>,
        feature_enabled: bool,
    ) -> Self {
        Self {
            config: Arc::new(ApiKeyConfig {
                static_keys,
                key_service,
                feature_enabled,
                retry_after: DEFAULT_RETRY_AFTER,
            }),
        }
    }
}

impl<S> Layer<S> for ApiKeyLayer {
    type Service = ApiKeyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

#[derive(Clone)]
pub struct ApiKeyService<S> {
    inner: S,
    config: Arc<ApiKeyConfig>,
}

impl<S> Service<Request> for ApiKeyService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let config = Arc::clone(&self.config);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let presented = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .filter(|k| !k.is_empty());

            let Some(key) = presented else {
                return Ok(outcome_response(ValidationOutcome::Unauthorized, None));
            };

            if super::contains_constant_time(&config.static_keys, &key) {
                req.extensions_mut().insert(ApiKeyIdentity { key });
                return inner.call(req).await;
            }

            if !config.feature_enabled {
                return Ok(outcome_response(ValidationOutcome::Unauthorized, None));
            }

            let Some(service) = config.key_service.as_ref() else {
                return Ok(outcome_response(ValidationOutcome::Unauthorized, None));
            };

            let (record, outcome) = service.validate_and_consume(&key).await;

            match outcome {
                ValidationOutcome::Authorized => {
                    req.extensions_mut().insert(ApiKeyIdentity { key });
                    if let Some(record) = record {
                        req.extensions_mut().insert(record);
                    }
                    inner.call(req).await
                }
                ValidationOutcome::Error => {
                    warn!(
                        key = %KeyIdentityGen::hash_identifier(&key, IDENTIFIER_HASH_PREFIX),
                        "temporary key validation could not reach the store"
                    );
                    Ok(outcome_response(outcome, Some(config.retry_after)))
                }
                other => {
                    warn!(
                        key = %KeyIdentityGen::hash_identifier(&key, IDENTIFIER_HASH_PREFIX),
                        outcome = other.as_str(),
                        "rejected inactive or unknown temporary key"
                    );
                    Ok(outcome_response(other, None))
                }
            }
        })
    }
}

fn outcome_response(outcome: ValidationOutcome, retry_after: Option<Duration>) -> Response {
    let status =
        StatusCode::from_u16(outcome.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({ "error": outcome.message().unwrap_or("error") });
    let mut response = (status, axum::Json(body)).into_response();

    if let Some(retry_after) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
    }
    response
}
