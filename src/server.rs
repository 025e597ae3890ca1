//! HTTP shell over the pipeline (feature `server`).
//!
//! Three routes, all stateless apart from the shared [`Pipeline`]:
//!
//! | Route           | Body                               | Reply                     |
//! |-----------------|------------------------------------|---------------------------|
//! | `GET /health`   | none                               | `{status, analyses_completed}` |
//! | `POST /analyze` | multipart: `file`, `domain`        | analysis outcome as JSON  |
//! | `POST /report`  | JSON: `{analysis, domain, kind}`   | `application/pdf` download |
//!
//! The report is rendered into a transient file, read back, and the file is
//! deleted before the response body is sent. Errors come back as
//! `{"error": "..."}` with a status code chosen by [`status_for`].

use crate::analyze::Pipeline;
use crate::domain::{AnalysisDomain, MediaKind, ReportKind};
use crate::error::{AnalysisError, BackendError, ExtractionError};
use crate::output::{AnalysisOutcome, AnalysisResult};
use crate::pipeline::input::UploadedArtifact;
use crate::pipeline::render::download_filename;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub analyses_completed: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub outcome: AnalysisOutcome,
    /// "Brain Scan", "Heart Report", ...
    pub caption: String,
    /// Suggested name for the PDF download.
    pub download_filename: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportRequest {
    pub analysis: String,
    pub domain: AnalysisDomain,
    pub kind: ReportKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An error reply: status code plus message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(e: AnalysisError) -> Self {
        let status = status_for(&e);
        if status.is_server_error() {
            error!("Request failed: {}", e);
        } else {
            warn!("Request rejected: {}", e);
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// HTTP status for each failure.
///
/// Bad uploads are the client's fault (4xx); a failing backend is an
/// upstream failure (502/504); rendering and configuration are ours (5xx).
pub fn status_for(e: &AnalysisError) -> StatusCode {
    match e {
        AnalysisError::Extraction(e) => match e {
            ExtractionError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ExtractionError::UnsupportedMediaKind { .. } | ExtractionError::KindMismatch { .. } => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ExtractionError::CorruptPdf { .. }
            | ExtractionError::EncryptedPdf
            | ExtractionError::PageTextFailed { .. }
            | ExtractionError::UndecodableImage { .. }
            | ExtractionError::NoExtractableText => StatusCode::UNPROCESSABLE_ENTITY,
            ExtractionError::TaskFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ExtractionError::FileNotFound { .. }
            | ExtractionError::PermissionDenied { .. }
            | ExtractionError::EmptyUpload
            | ExtractionError::DownloadFailed { .. }
            | ExtractionError::DownloadTimeout { .. } => StatusCode::BAD_REQUEST,
        },
        AnalysisError::Backend(BackendError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        AnalysisError::Backend(_) => StatusCode::BAD_GATEWAY,
        AnalysisError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AnalysisError::ProviderNotConfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AnalysisError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        AnalysisError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the router. The body limit follows the configured upload cap.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let body_limit = pipeline
        .config()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .route("/report", post(report))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(pipeline)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, pipeline: Arc<Pipeline>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(pipeline)).await
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health(State(pipeline): State<Arc<Pipeline>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        analyses_completed: pipeline.analyses_completed(),
    })
}

async fn analyze(
    State(pipeline): State<Arc<Pipeline>>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let mut domain: Option<AnalysisDomain> = None;
    let mut artifact: Option<UploadedArtifact> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "domain" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read domain: {e}")))?;
                domain = Some(value.trim().parse().map_err(ApiError::bad_request)?);
            }
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let kind = upload_kind(filename.as_deref(), content_type.as_deref())
                    .map_err(AnalysisError::from)?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file data: {e}")))?;
                let upload = UploadedArtifact::new(bytes.to_vec(), kind);
                artifact = Some(match filename {
                    Some(f) => upload.with_name(f),
                    None => upload,
                });
            }
            _ => {}
        }
    }

    let artifact = artifact.ok_or_else(|| ApiError::bad_request("No file provided."))?;
    let domain = domain.ok_or_else(|| ApiError::bad_request("No domain provided."))?;

    let outcome = pipeline.analyze(artifact, domain).await?;
    let download_filename =
        download_filename(outcome.kind(), chrono::Local::now().naive_local());

    Ok(Json(AnalyzeResponse {
        caption: outcome.caption(),
        download_filename,
        outcome,
    }))
}

async fn report(
    State(pipeline): State<Arc<Pipeline>>,
    Json(request): Json<ReportRequest>,
) -> Result<Response, ApiError> {
    if request.analysis.trim().is_empty() {
        return Err(ApiError::bad_request("Analysis text is empty."));
    }

    let result = AnalysisResult::new(request.analysis, request.kind);
    let handle = pipeline.render_result(&result, request.domain).await?;
    let filename = handle.download_filename().to_string();
    let mime = handle.mime_type();
    let bytes = handle.into_bytes().map_err(AnalysisError::from)?;

    info!("Serving {} ({} bytes)", filename, bytes.len());
    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Media kind of an upload: file name extension first, then Content-Type.
fn upload_kind(filename: Option<&str>, content_type: Option<&str>) -> Result<MediaKind, ExtractionError> {
    if let Some((_, ext)) = filename.and_then(|f| f.rsplit_once('.')) {
        return MediaKind::from_extension(ext);
    }
    content_type
        .and_then(MediaKind::from_mime)
        .ok_or_else(|| ExtractionError::UnsupportedMediaKind {
            extension: content_type.unwrap_or("unknown").to_string(),
        })
}
