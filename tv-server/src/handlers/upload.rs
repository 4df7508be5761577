//! Chunked upload endpoints (spec.md §4.1, §4.2).

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tv_model::UploadEncoding;

use crate::app_state::AppState;
use crate::errors::AppResult;

#[derive(Debug, Deserialize)]
pub struct ChunkQuery {
    pub upload_id: String,
    pub index: u32,
}

pub async fn upload_chunk(
    State(state): State<AppState>,
    Query(query): Query<ChunkQuery>,
    body: Bytes,
) -> AppResult<Json<serde_json::Value>> {
    state.file_store.save_chunk(&query.upload_id, query.index, &body).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct CompleteUploadBody {
    pub upload_id: String,
    pub name: String,
    pub total_chunks: u32,
    pub original_size: u64,
    pub compressed_size: u64,
    pub encoding: UploadEncoding,
}

#[derive(Debug, Serialize)]
pub struct CompleteUploadResponse {
    pub job_id: tv_contracts::UploadJobId,
}

pub async fn complete_upload(
    State(state): State<AppState>,
    Json(body): Json<CompleteUploadBody>,
) -> AppResult<Json<CompleteUploadResponse>> {
    let job_id = state
        .uploads
        .start_job(
            body.upload_id,
            body.name,
            body.total_chunks,
            body.original_size,
            body.compressed_size,
            body.encoding,
        )
        .await;
    Ok(Json(CompleteUploadResponse { job_id }))
}
