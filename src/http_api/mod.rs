use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::export::{DOWNLOAD_FILE_NAME, ReportResponse, XLSX_CONTENT_TYPE};
use crate::{GeneratedReport, ReportConfig, ReportError, generate_report};

#[derive(Clone)]
pub struct AppState {
    config: Arc<ReportConfig>,
}

impl AppState {
    pub fn new(config: ReportConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn with_shared(config: Arc<ReportConfig>) -> Self {
        Self { config }
    }

    fn config(&self) -> Arc<ReportConfig> {
        self.config.clone()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

#[derive(Debug)]
enum ApiError {
    Invalid(String),
    Internal(String),
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Invalid(message.into())
    }

    fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

impl From<ReportError> for ApiError {
    fn from(value: ReportError) -> Self {
        if value.is_client_error() {
            warn!(error = %value, "rejected upload");
            ApiError::Invalid(value.to_string())
        } else {
            error!(error = %value, "report generation failed");
            ApiError::Internal(format!("error processing file: {value}"))
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(value: axum::extract::multipart::MultipartError) -> Self {
        ApiError::Invalid(format!("malformed multipart body: {value}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Invalid(message) => {
                let body = Json(ErrorBody {
                    error: "invalid_request",
                    message,
                });
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            ApiError::Internal(message) => {
                let body = Json(ErrorBody {
                    error: "internal_error",
                    message,
                });
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/upload/", post(upload))
        .route("/upload/download", post(download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, config: ReportConfig) -> std::io::Result<()> {
    let state = AppState::new(config);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "transit-report HTTP API listening");
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// The three multipart fields every upload carries.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<Vec<u8>>,
    start_date: Option<String>,
    end_date: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => form.file = Some(field.bytes().await?.to_vec()),
                "start_date" => form.start_date = Some(field.text().await?),
                "end_date" => form.end_date = Some(field.text().await?),
                _ => {}
            }
        }
        Ok(form)
    }

    fn into_parts(self) -> Result<(Vec<u8>, String, String), ApiError> {
        let file = self
            .file
            .ok_or_else(|| ApiError::invalid("missing multipart field 'file'"))?;
        let start = self
            .start_date
            .ok_or_else(|| ApiError::invalid("missing multipart field 'start_date'"))?;
        let end = self
            .end_date
            .ok_or_else(|| ApiError::invalid("missing multipart field 'end_date'"))?;
        Ok((file, start, end))
    }
}

async fn run_report(state: &AppState, multipart: Multipart) -> Result<GeneratedReport, ApiError> {
    let (file, start, end) = UploadForm::read(multipart).await?.into_parts()?;
    let config = state.config();
    let report = tokio::task::spawn_blocking(move || generate_report(&file, &start, &end, &config))
        .await
        .map_err(|err| ApiError::internal(format!("report worker failed: {err}")))??;
    Ok(report)
}

async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ReportResponse>, ApiError> {
    let report = run_report(&state, multipart).await?;
    Ok(Json(report.into_response()))
}

async fn download(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let report = run_report(&state, multipart).await?;
    let headers = [
        (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{DOWNLOAD_FILE_NAME}\""),
        ),
    ];
    Ok((headers, report.workbook).into_response())
}
