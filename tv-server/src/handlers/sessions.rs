//! Session lifecycle: start, poll, keep-alive (spec.md §4.6).

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tv_contracts::{FileId, SessionId};
use tv_model::ParseSession;

use crate::app_state::AppState;
use crate::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionBody {
    pub file_id: Option<FileId>,
    #[serde(default)]
    pub file_ids: Vec<FileId>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: SessionId,
}

/// Reconciles the two ways a caller may name input files: a single `fileId`, a `fileIds` list, or
/// (tolerated) both, in which case `fileId` is treated as the first element.
fn resolve_file_ids(file_id: Option<FileId>, file_ids: Vec<FileId>) -> AppResult<Vec<FileId>> {
    match (file_id, file_ids) {
        (Some(id), extra) if extra.is_empty() => Ok(vec![id]),
        (None, ids) if !ids.is_empty() => Ok(ids),
        (Some(id), mut ids) => {
            ids.insert(0, id);
            Ok(ids)
        }
        (None, _) => Err(AppError::bad_request("one of fileId or fileIds is required")),
    }
}

pub async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<StartSessionBody>,
) -> AppResult<Json<StartSessionResponse>> {
    let file_ids = resolve_file_ids(body.file_id, body.file_ids)?;

    let mut file_paths = Vec::with_capacity(file_ids.len());
    for &id in &file_ids {
        state
            .file_store
            .get(id)
            .await
            .ok_or_else(|| AppError::not_found(format!("file {id} not found")))?;
        file_paths.push(state.file_store.get_file_path(id));
    }

    let session_id = if file_ids.len() == 1 {
        state.sessions.start_session(file_ids[0], file_paths.remove(0)).await
    } else {
        state.sessions.start_multi_session(file_ids, file_paths).await
    };

    Ok(Json(StartSessionResponse { session_id }))
}

pub async fn get_session(State(state): State<AppState>, Path(session_id): Path<SessionId>) -> AppResult<Json<ParseSession>> {
    state
        .sessions
        .get_session(session_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("session {session_id} not found")))
}

pub async fn touch_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> AppResult<Json<serde_json::Value>> {
    state.sessions.touch_session(session_id).await;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_file_id_resolves_to_one_element() {
        let id = FileId::new();
        let resolved = resolve_file_ids(Some(id), Vec::new()).unwrap();
        assert_eq!(resolved, vec![id]);
    }

    #[test]
    fn file_ids_list_resolves_as_is() {
        let ids = vec![FileId::new(), FileId::new()];
        let resolved = resolve_file_ids(None, ids.clone()).unwrap();
        assert_eq!(resolved, ids);
    }

    #[test]
    fn both_present_prepends_file_id() {
        let first = FileId::new();
        let rest = vec![FileId::new(), FileId::new()];
        let resolved = resolve_file_ids(Some(first), rest.clone()).unwrap();
        assert_eq!(resolved[0], first);
        assert_eq!(resolved[1..], rest[..]);
    }

    #[test]
    fn neither_present_is_a_bad_request() {
        let err = resolve_file_ids(None, Vec::new()).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }
}
