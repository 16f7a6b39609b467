//! `POST /convert`: renders the first page of an uploaded PDF to JPEG.
//!
//! Request-scope cancellation is handled by the outer `TimeoutLayer` in
//! `network::middleware` -- it already answers with `408` when a request
//! exceeds its deadline, so this handler only needs to worry about the
//! multipart body and the rasterizer.

use std::io::Cursor;

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use serde_json::json;

use super::AppState;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const JPEG_QUALITY: u8 = 85;

/// Rasterizes the first page of a PDF document. The concrete implementation
/// (PDF parsing, page layout, rendering) is an external concern; this trait
/// is the seam a production renderer plugs into.
pub trait DocumentOpener: Send + Sync {
    fn render_first_page(&self, pdf_bytes: &[u8]) -> Result<RgbImage, ConvertError>;
}

#[derive(Debug)]
pub enum ConvertError {
    /// The document could not be parsed or has no renderable page.
    Invalid,
    /// Rendering failed for a reason unrelated to the input document.
    Failed,
}

/// Stand-in renderer: always returns a blank US-Letter page at 72 dpi.
/// A real rasterizer is out of scope; this keeps the endpoint's contract
/// (multipart in, JPEG out) exercisable end to end without one.
pub struct NullDocumentOpener;

impl DocumentOpener for NullDocumentOpener {
    fn render_first_page(&self, _pdf_bytes: &[u8]) -> Result<RgbImage, ConvertError> {
        Ok(RgbImage::from_pixel(612, 792, image::Rgb([255, 255, 255])))
    }
}

pub async fn convert_handler(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(_err) => return bad_request("file field is required"),
        };

        if field.name() != Some("file") {
            continue;
        }

        file_name = field.file_name().map(str::to_string);

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(_err) => return too_large(),
        };

        if bytes.len() > MAX_UPLOAD_BYTES {
            return too_large();
        }

        file_bytes = Some(bytes.to_vec());
    }

    let Some(bytes) = file_bytes else {
        return bad_request("file field is required");
    };

    let name = file_name.unwrap_or_default();
    if !name.to_ascii_lowercase().ends_with(".pdf") {
        return bad_request("file must be a pdf");
    }

    let image = match state.document.render_first_page(&bytes) {
        Ok(image) => image,
        Err(ConvertError::Invalid) => return bad_request("file must be a pdf"),
        Err(ConvertError::Failed) => return service_unavailable(),
    };

    let mut jpeg_bytes = Vec::new();
    let encode_result = JpegEncoder::new_with_quality(&mut jpeg_bytes, JPEG_QUALITY).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    );
    if encode_result.is_err() {
        return service_unavailable();
    }

    let basename = name.rsplit_once('.').map_or(name.as_str(), |(stem, _)| stem);
    let disposition = format!("inline; filename=\"{basename}.jpg\"");

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        jpeg_bytes,
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({ "error": message })),
    )
        .into_response()
}

fn too_large() -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        axum::Json(json!({ "error": "file too large" })),
    )
        .into_response()
}

fn service_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        axum::Json(json!({ "error": "service unavailable" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::routing::post;
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_state() -> AppState {
        let (_recorder, handle) = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build()
            .unwrap();
        AppState {
            shutdown: Arc::new(crate::network::ShutdownController::new()),
            config: Arc::new(crate::network::NetworkConfig::default()),
            start_time: std::time::Instant::now(),
            key_service: None,
            metrics_handle: handle,
            document: Arc::new(NullDocumentOpener),
        }
    }

    fn multipart_body(field_name: &str, filename: &str, contents: &[u8]) -> (String, Vec<u8>) {
        let boundary = "X-BOUNDARY-TEST";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={boundary}"), body)
    }

    #[tokio::test]
    async fn missing_file_field_is_400() {
        let app = Router::new()
            .route("/convert", post(convert_handler))
            .with_state(app_state());

        let (content_type, body) = multipart_body("not-file", "doc.pdf", b"%PDF-1.4");
        let response = app
            .oneshot(
                axum::http::Request::post("/convert")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_pdf_extension_is_400() {
        let app = Router::new()
            .route("/convert", post(convert_handler))
            .with_state(app_state());

        let (content_type, body) = multipart_body("file", "doc.txt", b"hello");
        let response = app
            .oneshot(
                axum::http::Request::post("/convert")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn valid_pdf_upload_returns_jpeg() {
        let app = Router::new()
            .route("/convert", post(convert_handler))
            .with_state(app_state());

        let (content_type, body) = multipart_body("file", "report.pdf", b"%PDF-1.4 fake");
        let response = app
            .oneshot(
                axum::http::Request::post("/convert")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/jpeg"
        );
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(disposition, "inline; filename=\"report.jpg\"");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!bytes.is_empty());
    }
}
