//! Upload job polling (spec.md §4.2). The websocket counterpart lives in `crate::websocket`.

use axum::extract::{Path, State};
use axum::Json;
use tv_contracts::UploadJobId;
use tv_model::UploadJob;

use crate::app_state::AppState;
use crate::errors::{AppError, AppResult};

pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<UploadJobId>) -> AppResult<Json<UploadJob>> {
    state
        .uploads
        .get(job_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("upload job {job_id} not found")))
}
