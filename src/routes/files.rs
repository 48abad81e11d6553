use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::{
    AppState,
    config::Config,
    error::AppError,
    models::{ColumnCategories, ColumnProfile, Row},
    services::workbook::{ensure_within_limit, load_file_from_url, parse_workbook},
    services::workspace::FileSummary,
};

const DEFAULT_PREVIEW_ROWS: usize = 20;
const MAX_PREVIEW_ROWS: usize = 500;

pub fn routes(config: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route("/files", get(list_files).post(fetch_file))
        .route(
            "/files/upload",
            post(upload_file).layer(DefaultBodyLimit::max(config.max_file_size)),
        )
        .route("/files/:file", axum::routing::delete(remove_file))
        .route("/files/:file/sheets/:sheet", get(preview_sheet))
}

#[derive(Debug, Deserialize)]
pub struct FetchFileRequest {
    name: String,
    signed_url: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SheetPreview {
    file: String,
    sheet: String,
    row_count: usize,
    truncated: bool,
    columns: Vec<String>,
    categories: ColumnCategories,
    profiles: Vec<ColumnProfile>,
    rows: Vec<Row>,
}

async fn list_files(State(state): State<Arc<AppState>>) -> Json<Vec<FileSummary>> {
    Json(state.workspace.lock().file_summaries())
}

async fn fetch_file(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FetchFileRequest>,
) -> Result<(StatusCode, Json<FileSummary>), AppError> {
    if request.signed_url.trim().is_empty() {
        return Err(AppError::InvalidInput("No file URL provided".to_string()));
    }
    tracing::info!(
        "Downloading file {}, URL length: {}",
        request.name,
        request.signed_url.len()
    );
    let download_start = std::time::Instant::now();
    let file_data = load_file_from_url(&request.signed_url, state.config.max_file_size).await?;
    tracing::info!(
        "File downloaded, size: {}KB, took: {:?}",
        file_data.len() / 1024,
        download_start.elapsed()
    );

    ingest(&state, request.name, file_data).await
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<FileSummary>), AppError> {
    let body = upload_body(body)?;
    if body.is_empty() {
        return Err(AppError::InvalidInput("Uploaded file is empty".to_string()));
    }
    let name = params.name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "workbook.xlsx".to_string());

    ingest(&state, name, body).await
}

/// Body extraction failures as JSON errors; an over-limit body is a 413.
fn upload_body(body: Result<Bytes, BytesRejection>) -> Result<Bytes, AppError> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(rejection.body_text())
        } else {
            AppError::InvalidInput(rejection.body_text())
        }
    })
}

async fn ingest(
    state: &Arc<AppState>,
    name: String,
    file_data: Bytes,
) -> Result<(StatusCode, Json<FileSummary>), AppError> {
    ensure_within_limit(file_data.len(), state.config.max_file_size)?;

    let max_rows = state.config.max_rows_per_sheet;
    let file = tokio::task::spawn_blocking(move || parse_workbook(&name, file_data, max_rows))
        .await
        .map_err(|e| AppError::Internal(format!("Workbook parser stopped: {}", e)))??;

    let mut workspace = state.workspace.lock();
    let index = workspace.add_file(file);
    let summary = workspace
        .file_summaries()
        .into_iter()
        .nth(index)
        .ok_or_else(|| AppError::Internal(format!("File {} missing after upload", index)))?;

    Ok((StatusCode::CREATED, Json(summary)))
}

async fn preview_sheet(
    State(state): State<Arc<AppState>>,
    Path((file, sheet)): Path<(usize, usize)>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<SheetPreview>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_PREVIEW_ROWS).min(MAX_PREVIEW_ROWS);

    let workspace = state.workspace.lock();
    let file_name = workspace.file(file)?.name.clone();
    let data = workspace.sheet(file, sheet)?;

    Ok(Json(SheetPreview {
        file: file_name,
        sheet: data.name.clone(),
        row_count: data.rows.len(),
        truncated: data.truncated,
        columns: data.columns.clone(),
        categories: data.categories.clone(),
        profiles: data.profiles.clone(),
        rows: data.rows.iter().take(limit).cloned().collect(),
    }))
}

async fn remove_file(
    State(state): State<Arc<AppState>>,
    Path(file): Path<usize>,
) -> Result<StatusCode, AppError> {
    state.workspace.lock().remove_file(file)?;
    Ok(StatusCode::NO_CONTENT)
}
