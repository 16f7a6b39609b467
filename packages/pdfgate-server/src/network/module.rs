//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation allows the rest of the application to
//! finish wiring shared state between `start()` and `serve()`.

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::handlers::{
    cleanup_handler, convert_handler, debug_vars_handler, get_key_handler, health_handler,
    issue_key_handler, revoke_key_handler, AppState, DocumentOpener,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::apikey::KeyService;
use crate::middleware::{AdminLayer, ApiKeyLayer};

/// Manages the full HTTP server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates shared state (shutdown controller)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
    static_keys: HashSet<String>,
    master_keys: HashSet<String>,
    key_service: Option<Arc<KeyService>>,
    document: Arc<dyn DocumentOpener>,
    metrics_handle: PrometheusHandle,
    admin_rate_limit_per_minute: u32,
    admin_burst: u32,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: NetworkConfig,
        static_keys: HashSet<String>,
        master_keys: HashSet<String>,
        key_service: Option<Arc<KeyService>>,
        document: Arc<dyn DocumentOpener>,
        metrics_handle: PrometheusHandle,
        admin_rate_limit_per_minute: u32,
        admin_burst: u32,
    ) -> Self {
        Self {
            config,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
            static_keys,
            master_keys,
            key_service,
            document,
            metrics_handle,
            admin_rate_limit_per_minute,
            admin_burst,
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /healthz` -- unconditional liveness check
    /// - `GET /debug/vars` -- Prometheus metrics snapshot
    /// - `POST /convert` -- gated by [`ApiKeyLayer`]
    /// - `/admin/api-keys*` -- gated by [`AdminLayer`]
    #[must_use]
    pub fn build_router(&self) -> Router {
        let state = AppState {
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
            key_service: self.key_service.clone(),
            metrics_handle: self.metrics_handle.clone(),
            document: Arc::clone(&self.document),
        };

        let api_key_layer = ApiKeyLayer::new(
            self.static_keys.clone(),
            self.key_service.clone(),
            self.key_service.is_some(),
        );
        let admin_layer = AdminLayer::new(
            self.master_keys.clone(),
            self.admin_rate_limit_per_minute,
            self.admin_burst,
        );

        let convert_routes = Router::new()
            .route("/convert", post(convert_handler).fallback(not_found))
            .layer(api_key_layer);

        let admin_routes = Router::new()
            .route(
                "/admin/api-keys",
                post(issue_key_handler).fallback(not_found),
            )
            .route(
                "/admin/api-keys/cleanup",
                post(cleanup_handler).fallback(not_found),
            )
            .route(
                "/admin/api-keys/{key}/revoke",
                post(revoke_key_handler).fallback(not_found),
            )
            .route(
                "/admin/api-keys/{key}",
                get(get_key_handler).fallback(not_found),
            )
            .layer(admin_layer);

        let layers = build_http_layers(&self.config);

        Router::new()
            .route("/healthz", get(health_handler))
            .route("/debug/vars", get(debug_vars_handler))
            .merge(convert_routes)
            .merge(admin_routes)
            .fallback(not_found)
            .layer(layers)
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires.
    ///
    /// Consumes `self` because the listener is moved into the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .expect("start() must be called before serve()");
        let shutdown_ctrl = Arc::clone(&self.shutdown);
        let router = self.build_router();

        shutdown_ctrl.set_ready();

        info!("serving HTTP connections");
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        shutdown_ctrl.trigger_shutdown();
        shutdown_ctrl
            .wait_for_drain(std::time::Duration::from_secs(30))
            .await;
        Ok(())
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
}
