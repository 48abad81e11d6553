use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use crate::{
    AppState,
    error::AppError,
    services::orchestrator::{start_analysis, start_rerun, AnalysisRequest},
    services::steps::{BoardSnapshot, StepEdit},
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analysis", get(get_analysis).post(run_analysis).delete(reset_analysis))
        .route("/analysis/steps/:id/rerun", post(rerun_step))
}

async fn get_analysis(State(state): State<Arc<AppState>>) -> Json<BoardSnapshot> {
    Json(state.workspace.lock().board.snapshot())
}

#[axum::debug_handler]
async fn run_analysis(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalysisRequest>,
) -> Result<(StatusCode, Json<BoardSnapshot>), AppError> {
    let wait = request.wait;
    let handle = start_analysis(&state, request)?;

    if !wait {
        return Ok((StatusCode::ACCEPTED, Json(state.workspace.lock().board.snapshot())));
    }

    if let Err(e) = handle.await {
        tracing::error!("Analysis task stopped unexpectedly: {}", e);
    }
    Ok((StatusCode::OK, Json(state.workspace.lock().board.snapshot())))
}

async fn rerun_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(edit): Json<StepEdit>,
) -> Result<(StatusCode, Json<BoardSnapshot>), AppError> {
    start_rerun(&state, &id, edit)?;
    Ok((StatusCode::ACCEPTED, Json(state.workspace.lock().board.snapshot())))
}

async fn reset_analysis(State(state): State<Arc<AppState>>) -> Json<BoardSnapshot> {
    let mut workspace = state.workspace.lock();
    workspace.board.reset();
    Json(workspace.board.snapshot())
}
