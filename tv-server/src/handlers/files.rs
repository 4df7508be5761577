//! Raw file listing, rename, and delete (spec.md §4.1).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tv_contracts::FileId;
use tv_model::FileInfo;

use crate::app_state::AppState;
use crate::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_true")]
    pub newest_first: bool,
}

fn default_limit() -> usize {
    500
}

fn default_true() -> bool {
    true
}

pub async fn list_files(State(state): State<AppState>, Query(query): Query<ListFilesQuery>) -> Json<Vec<FileInfo>> {
    Json(state.file_store.list(query.limit, query.newest_first).await)
}

pub async fn delete_file(State(state): State<AppState>, Path(file_id): Path<FileId>) -> AppResult<Json<serde_json::Value>> {
    state.file_store.delete(file_id).await?;
    // Deleting the raw file also invalidates whatever parsed store and live sessions are backed
    // by it (spec.md §4.1 "a delete cascades to its store"); routed through the session manager
    // rather than the catalog directly so sessions get dropped too.
    let _ = state.sessions.delete_parsed_file(file_id).await;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct RenameFileBody {
    pub name: String,
}

pub async fn rename_file(
    State(state): State<AppState>,
    Path(file_id): Path<FileId>,
    Json(body): Json<RenameFileBody>,
) -> AppResult<Json<FileInfo>> {
    if body.name.trim().is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    let info = state.file_store.rename(file_id, body.name).await?;
    Ok(Json(info))
}
