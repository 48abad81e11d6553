use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::{AppState, error::AppError, services::workspace::Workspace};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/selection", get(get_selection).delete(clear_selection))
        .route("/selection/toggle", post(toggle_sheet))
        .route("/selection/:file", put(set_file_selection))
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    file_index: usize,
    sheet_index: usize,
}

#[derive(Debug, Deserialize)]
pub struct SetSelectionRequest {
    #[serde(default)]
    sheet_indices: Vec<usize>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SelectedSheet {
    file_index: usize,
    sheet_index: usize,
    file: String,
    sheet: String,
}

#[derive(Debug, Serialize)]
pub struct SelectionView {
    selected: Vec<SelectedSheet>,
}

impl SelectionView {
    fn of(workspace: &Workspace) -> Self {
        let selected = workspace
            .selection
            .entries()
            .filter_map(|(file_index, sheet_index)| {
                let file = workspace.files().get(file_index)?;
                let sheet = file.sheets.get(sheet_index)?;
                Some(SelectedSheet {
                    file_index,
                    sheet_index,
                    file: file.name.clone(),
                    sheet: sheet.name.clone(),
                })
            })
            .collect();
        Self { selected }
    }
}

async fn get_selection(State(state): State<Arc<AppState>>) -> Json<SelectionView> {
    Json(SelectionView::of(&state.workspace.lock()))
}

async fn toggle_sheet(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<SelectionView>, AppError> {
    let mut workspace = state.workspace.lock();
    let selected = workspace.toggle_sheet(request.file_index, request.sheet_index)?;
    tracing::debug!(
        "Sheet {}/{} is now {}",
        request.file_index,
        request.sheet_index,
        if selected { "selected" } else { "deselected" }
    );
    Ok(Json(SelectionView::of(&workspace)))
}

async fn set_file_selection(
    State(state): State<Arc<AppState>>,
    Path(file): Path<usize>,
    Json(request): Json<SetSelectionRequest>,
) -> Result<Json<SelectionView>, AppError> {
    let mut workspace = state.workspace.lock();
    workspace.set_file_selection(file, &request.sheet_indices)?;
    Ok(Json(SelectionView::of(&workspace)))
}

async fn clear_selection(State(state): State<Arc<AppState>>) -> Json<SelectionView> {
    let mut workspace = state.workspace.lock();
    workspace.selection.clear();
    Json(SelectionView::of(&workspace))
}
