//! Protects administrator endpoints: per-client-IP token-bucket rate
//! limiting, then the `X-Admin-Key` check.
//!
//! The bucket is keyed on client IP and built on `governor`'s keyed
//! limiter. `governor::RateLimiter::keyed` is backed by a `DashMap`-shaped
//! store internally and exposes `retain_recent()`, which gives the idle
//! bucket sweep this middleware needs without a separate cleanup task.

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use serde_json::json;
use tower::{Layer, Service};
use tracing::warn;

const ADMIN_KEY_HEADER: &str = "x-admin-key";
/// Default requests/minute per client IP.
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 100;
/// Default burst capacity per client IP.
pub const DEFAULT_BURST: u32 = 20;

type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Operator identity attached to request extensions once the admin key
/// checks out. The raw key is kept only long enough to hash for audit logs.
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    pub operator: String,
}

struct AdminConfig {
    master_keys: HashSet<String>,
    limiter: IpLimiter,
}

/// `Layer` wrapping the admin router with rate limiting and key checks.
#[derive(Clone)]
pub struct AdminLayer {
    config: Arc<AdminConfig>,
}

impl AdminLayer {
    #[must_use]
    pub fn new(master_keys: HashSet<String>, rate_limit_per_minute: u32, burst: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit_per_minute.max(1)).unwrap())
            .allow_burst(NonZeroU32::new(burst.max(1)).unwrap());
        Self {
            config: Arc::new(AdminConfig {
                master_keys,
                limiter: RateLimiter::keyed(quota),
            }),
        }
    }
}

impl<S> Layer<S> for AdminLayer {
    type Service = AdminService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdminService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

#[derive(Clone)]
pub struct AdminService<S> {
    inner: S,
    config: Arc<AdminConfig>,
}

impl<S> Service<Request> for AdminService<S>
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
            let client_ip = client_ip_of(&req);

            // Evicts buckets idle for more than governor's configured
            // window before checking, bounding the map's memory.
            config.limiter.retain_recent();
            if config.limiter.check_key(&client_ip).is_err() {
                return Ok(json_error(
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate limit exceeded",
                ));
            }

            let presented = req
                .headers()
                .get(ADMIN_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let Some(admin_key) = presented.filter(|k| !k.is_empty()) else {
                return Ok(json_error(StatusCode::UNAUTHORIZED, "unauthorized"));
            };

            if !super::contains_constant_time(&config.master_keys, &admin_key) {
                warn!(ip = %client_ip, "admin request with unrecognized key");
                return Ok(json_error(StatusCode::UNAUTHORIZED, "unauthorized"));
            }

            req.extensions_mut().insert(AdminIdentity {
                operator: admin_key,
            });
            inner.call(req).await
        })
    }
}

fn client_ip_of(req: &Request) -> String {
    if let Some(value) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = value.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}
