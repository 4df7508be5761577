//! The 18-route `/api/v1` surface (SPEC_FULL.md §6), grounded on
//! `ferrex-server/src/routes/v1.rs`'s `create_v1_router` shape.

use axum::routing::{delete, get, patch, post};
use axum::Router;

use crate::app_state::AppState;
use crate::handlers::{files, jobs, query, sessions, upload};
use crate::websocket;

pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/files/upload/chunk", post(upload::upload_chunk))
        .route("/files/upload/complete", post(upload::complete_upload))
        .route("/jobs/{jobId}", get(jobs::get_job))
        .route("/jobs/{jobId}/ws", get(websocket::job_progress_ws))
        .route("/files", get(files::list_files))
        .route("/files/{fileId}", delete(files::delete_file))
        .route("/files/{fileId}", patch(files::rename_file))
        .route("/sessions", post(sessions::start_session))
        .route("/sessions/{sessionId}", get(sessions::get_session))
        .route("/sessions/{sessionId}/ws", get(websocket::session_progress_ws))
        .route("/sessions/{sessionId}/touch", post(sessions::touch_session))
        .route("/sessions/{sessionId}/entries", get(query::get_entries))
        .route("/sessions/{sessionId}/chunk", get(query::get_chunk))
        .route("/sessions/{sessionId}/values-at", get(query::get_values_at_time))
        .route("/sessions/{sessionId}/boundary", get(query::get_boundary_values))
        .route("/sessions/{sessionId}/index-at", get(query::get_index_by_time))
        .route("/sessions/{sessionId}/time-tree", get(query::get_time_tree))
        .route("/sessions/{sessionId}/signals", get(query::get_signals))
}
