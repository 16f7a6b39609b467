//! pdfgate server — axum HTTP gateway fronting a PDF-to-JPEG convert
//! endpoint behind a two-tier API key authorization layer.

pub mod apikey;
pub mod config;
pub mod metrics;
pub mod middleware;
pub mod network;

pub use config::AppConfig;
pub use network::{AppState, NetworkModule};
