//! HTTP surface compatible with the OpenAI audio transcription endpoint.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::error::TranscribeError;
use crate::scheduler::{JobParams, ResponseFormat, Transcription};
use crate::service::TranscriptionService;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TranscriptionService>,
    pub model_id: String,
}

#[derive(Serialize)]
struct TranscriptionResponse {
    text: String,
    task: &'static str,
    language: String,
    duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_cleaned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
    /// Admission time, unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<i64>,
}

#[derive(Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<ModelInfo>,
}

#[derive(Serialize)]
struct ModelInfo {
    id: String,
    object: &'static str,
    created: i64,
    owned_by: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
    queue_depth: usize,
    queue_capacity: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// An error already mapped to its HTTP status.
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

impl From<TranscribeError> for ApiError {
    fn from(e: TranscribeError) -> Self {
        let (status, message) = match &e {
            TranscribeError::AdmissionRejected { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server is busy (queue full). Please try again later.".to_string(),
            ),
            TranscribeError::ServiceStopped => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server is shutting down".to_string(),
            ),
            TranscribeError::DeadlineExceeded(_) => (StatusCode::GATEWAY_TIMEOUT, e.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/models", get(models_handler))
        .route("/v1/audio/transcriptions", post(transcription_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.service.is_accepting() {
        "healthy"
    } else {
        "stopping"
    };

    Json(HealthResponse {
        status,
        model: state.model_id.clone(),
        queue_depth: state.service.queue_depth(),
        queue_capacity: state.service.capacity(),
    })
}

/// Model listing used by OpenAI-compatible clients to check the connection.
async fn models_handler(State(state): State<AppState>) -> impl IntoResponse {
    tracing::debug!("Model list requested");
    Json(ModelList {
        object: "list",
        data: vec![ModelInfo {
            id: state.model_id.clone(),
            object: "model",
            created: chrono::Utc::now().timestamp(),
            owned_by: "transcribe-lite",
        }],
    })
}

/// Upload plus form options, as read from the multipart body.
struct TranscriptionForm {
    file: Vec<u8>,
    file_name: Option<String>,
    params: JobParams,
}

async fn read_form(mut multipart: Multipart) -> Result<TranscriptionForm, ApiError> {
    let mut file = None;
    let mut params = JobParams::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {}", e)))?;
                file = Some((bytes.to_vec(), file_name));
            }
            "language" => params.language = read_text(field).await?,
            "clean_tags" => params.clean = parse_bool("clean_tags", &read_text(field).await?)?,
            "response_format" => {
                params.response_format = read_text(field)
                    .await?
                    .parse::<ResponseFormat>()
                    .map_err(ApiError::bad_request)?
            }
            // Accepted for compatibility, not used by the engine.
            "model" | "prompt" | "temperature" => {
                read_text(field).await?;
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown form field");
            }
        }
    }

    let (file, file_name) = file.ok_or_else(|| ApiError::bad_request("Missing required field: file"))?;
    if file.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }
    if params.language.trim().is_empty() {
        params.language = "auto".to_string();
    }

    Ok(TranscriptionForm {
        file,
        file_name,
        params,
    })
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    let name = field.name().unwrap_or_default().to_string();
    field
        .text()
        .await
        .map(|s| s.trim().to_string())
        .map_err(|e| ApiError::bad_request(format!("Invalid value for {}: {}", name, e)))
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ApiError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ApiError::bad_request(format!(
            "Invalid boolean for {}: {}",
            field, value
        ))),
    }
}

async fn transcription_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = read_form(multipart).await?;
    let format = form.params.response_format;

    let result = state
        .service
        .submit(&form.file, form.file_name.as_deref(), form.params)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Transcription request failed");
            ApiError::from(e)
        })?;

    Ok(render(result, format))
}

fn render(result: Transcription, format: ResponseFormat) -> Response {
    if format == ResponseFormat::Text {
        return result.text.into_response();
    }

    let verbose = format == ResponseFormat::VerboseJson;
    Json(TranscriptionResponse {
        text: result.text,
        task: "transcribe",
        language: result.language,
        duration: result.processing_seconds,
        raw_text: verbose.then_some(result.raw_text),
        is_cleaned: verbose.then_some(result.cleaned),
        job_id: verbose.then(|| result.job_id.to_string()),
        created: verbose.then(|| result.admitted_at.timestamp()),
    })
    .into_response()
}
