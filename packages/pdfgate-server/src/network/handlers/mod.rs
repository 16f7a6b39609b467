//! HTTP handler definitions for the pdfgate server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod admin;
pub mod convert;
pub mod health;

pub use admin::{cleanup_handler, get_key_handler, issue_key_handler, revoke_key_handler};
pub use convert::{convert_handler, DocumentOpener, NullDocumentOpener};
pub use health::{debug_vars_handler, health_handler};

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;

use super::{NetworkConfig, ShutdownController};
use crate::apikey::KeyService;

/// Shared application state passed to all axum handlers via `State`
/// extraction. `Arc`-wrapped so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Network configuration (bind address, CORS, request timeout).
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
    /// Temporary-key orchestration layer. `None` when the dynamic-key path
    /// is disabled (`ENABLE_FIRESTORE_KEYS=false`).
    pub key_service: Option<Arc<KeyService>>,
    /// Snapshot handle for rendering `/debug/vars`.
    pub metrics_handle: PrometheusHandle,
    /// PDF page rasterizer backing `/convert`.
    pub document: Arc<dyn DocumentOpener>,
}
