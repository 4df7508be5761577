//! The per-session read surface (spec.md §4.7), routed through [`tv_core::QueryExecutor`] so
//! heavy (full-scan/aggregate) reads stay bounded regardless of how many sessions are live.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tv_contracts::{SessionId, SignalKey};
use tv_core::CancellationContext;
use tv_model::{BoundaryValues, EntryPage, LogEntry, QueryFilters, SearchMode, SignalType, SortBy, SortOrder};

use crate::app_state::AppState;
use crate::errors::AppResult;

fn split_signal_keys(raw: Option<&str>) -> Option<Vec<SignalKey>> {
    raw.map(|s| s.split(',').filter(|k| !k.is_empty()).map(|k| SignalKey::from(k.to_string())).collect())
}

/// Builds the per-request cancellation context from an optional `deadlineMs` query parameter
/// (SPEC_FULL.md §6 "all accept a cancellation deadline"). Absent or zero means no deadline.
fn context_from_deadline(deadline_ms: Option<u64>) -> CancellationContext {
    match deadline_ms {
        Some(ms) if ms > 0 => CancellationContext::with_deadline(Duration::from_millis(ms)),
        _ => CancellationContext::none(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesQuery {
    pub offset_start: Option<u64>,
    pub offset_end_exclusive: Option<u64>,
    #[serde(default)]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    pub search: Option<String>,
    #[serde(default)]
    pub search_mode: SearchMode,
    pub category: Option<String>,
    pub signal_type: Option<SignalType>,
    pub signal_keys: Option<String>,
    #[serde(default)]
    pub changed_only: bool,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub order: SortOrder,
    pub deadline_ms: Option<u64>,
}

fn default_page_size() -> u64 {
    500
}

impl EntriesQuery {
    fn filters(&self) -> QueryFilters {
        QueryFilters {
            search: self.search.clone(),
            search_mode: self.search_mode,
            category: self.category.clone(),
            signal_type: self.signal_type,
            signal_keys: split_signal_keys(self.signal_keys.as_deref()),
            changed_only: self.changed_only,
            sort_by: self.sort_by,
            order: self.order,
        }
    }
}

/// Serves both `getEntries` (a positional window, when `offsetStart`/`offsetEndExclusive` are
/// given) and `queryEntries` (filtered + paginated, the default) — spec.md §4.4 names both as
/// distinct contract operations, but the route table only carries one `/entries` endpoint for
/// them (SPEC_FULL.md §6).
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EntriesResponse {
    Window(Vec<LogEntry>),
    Page(EntryPage),
}

/// Whether a request asks for the positional `[offsetStart, offsetEndExclusive)` window rather
/// than the filtered/paginated default.
fn wants_offset_window(query: &EntriesQuery) -> Option<(u64, u64)> {
    match (query.offset_start, query.offset_end_exclusive) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => None,
    }
}

pub async fn get_entries(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<EntriesQuery>,
) -> AppResult<Json<EntriesResponse>> {
    let ctx = context_from_deadline(query.deadline_ms);
    if let Some((start, end)) = wants_offset_window(&query) {
        let entries = state.query.get_entries(&ctx, session_id, start, end).await?;
        return Ok(Json(EntriesResponse::Window(entries)));
    }
    let page = state.query.query_entries(&ctx, session_id, query.filters(), query.page, query.page_size).await?;
    Ok(Json(EntriesResponse::Page(page)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkQuery {
    pub start_ts: i64,
    pub end_ts: i64,
    pub signal_keys: Option<String>,
    pub deadline_ms: Option<u64>,
}

pub async fn get_chunk(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<ChunkQuery>,
) -> AppResult<Json<Vec<LogEntry>>> {
    let ctx = context_from_deadline(query.deadline_ms);
    let keys = split_signal_keys(query.signal_keys.as_deref());
    let entries = state.query.get_chunk(&ctx, session_id, query.start_ts, query.end_ts, keys).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuesAtQuery {
    pub ts: i64,
    pub signal_keys: Option<String>,
    pub deadline_ms: Option<u64>,
}

pub async fn get_values_at_time(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<ValuesAtQuery>,
) -> AppResult<Json<Vec<LogEntry>>> {
    let ctx = context_from_deadline(query.deadline_ms);
    let keys = split_signal_keys(query.signal_keys.as_deref());
    let entries = state.query.get_values_at_time(&ctx, session_id, query.ts, keys).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryQuery {
    pub start_ts: i64,
    pub end_ts: i64,
    pub signal_keys: Option<String>,
    pub deadline_ms: Option<u64>,
}

pub async fn get_boundary_values(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<BoundaryQuery>,
) -> AppResult<Json<BoundaryValues>> {
    let ctx = context_from_deadline(query.deadline_ms);
    let keys = split_signal_keys(query.signal_keys.as_deref()).unwrap_or_default();
    let boundary = state.query.get_boundary_values(&ctx, session_id, query.start_ts, query.end_ts, keys).await?;
    Ok(Json(boundary))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexAtQuery {
    pub ts: i64,
    pub search: Option<String>,
    #[serde(default)]
    pub search_mode: SearchMode,
    pub category: Option<String>,
    pub signal_type: Option<SignalType>,
    pub signal_keys: Option<String>,
    #[serde(default)]
    pub changed_only: bool,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub order: SortOrder,
    pub deadline_ms: Option<u64>,
}

impl IndexAtQuery {
    fn filters(&self) -> QueryFilters {
        QueryFilters {
            search: self.search.clone(),
            search_mode: self.search_mode,
            category: self.category.clone(),
            signal_type: self.signal_type,
            signal_keys: split_signal_keys(self.signal_keys.as_deref()),
            changed_only: self.changed_only,
            sort_by: self.sort_by,
            order: self.order,
        }
    }
}

pub async fn get_index_by_time(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<IndexAtQuery>,
) -> AppResult<Json<i64>> {
    let ctx = context_from_deadline(query.deadline_ms);
    let index = state.query.get_index_by_time(&ctx, session_id, query.filters(), query.ts).await?;
    Ok(Json(index))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeTreeQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub search_mode: SearchMode,
    pub category: Option<String>,
    pub signal_type: Option<SignalType>,
    pub signal_keys: Option<String>,
    #[serde(default)]
    pub changed_only: bool,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub order: SortOrder,
    pub deadline_ms: Option<u64>,
}

impl TimeTreeQuery {
    fn filters(&self) -> QueryFilters {
        QueryFilters {
            search: self.search.clone(),
            search_mode: self.search_mode,
            category: self.category.clone(),
            signal_type: self.signal_type,
            signal_keys: split_signal_keys(self.signal_keys.as_deref()),
            changed_only: self.changed_only,
            sort_by: self.sort_by,
            order: self.order,
        }
    }
}

pub async fn get_time_tree(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<TimeTreeQuery>,
) -> AppResult<Json<Vec<tv_model::TimeTreeNode>>> {
    let ctx = context_from_deadline(query.deadline_ms);
    let nodes = state.query.get_time_tree(&ctx, session_id, query.filters()).await?;
    Ok(Json(nodes))
}

#[derive(Debug, Serialize)]
pub struct SignalsResponse {
    pub signals: Vec<SignalKey>,
    pub signal_types: HashMap<String, SignalType>,
    pub categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalsQuery {
    pub deadline_ms: Option<u64>,
}

pub async fn get_signals(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<SignalsQuery>,
) -> AppResult<Json<SignalsResponse>> {
    let ctx = context_from_deadline(query.deadline_ms);
    let signals = state.query.get_signals(&ctx, session_id).await?;
    let signal_types = state.query.get_signal_types(&ctx, session_id).await?;
    let categories = state.query.get_categories(&ctx, session_id).await?;
    Ok(Json(SignalsResponse { signals, signal_types, categories }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_query() -> EntriesQuery {
        EntriesQuery {
            offset_start: None,
            offset_end_exclusive: None,
            page: 0,
            page_size: default_page_size(),
            search: None,
            search_mode: SearchMode::default(),
            category: None,
            signal_type: None,
            signal_keys: None,
            changed_only: false,
            sort_by: SortBy::default(),
            order: SortOrder::default(),
            deadline_ms: None,
        }
    }

    #[test]
    fn both_offsets_present_selects_the_window() {
        let mut query = base_query();
        query.offset_start = Some(10);
        query.offset_end_exclusive = Some(20);
        assert_eq!(wants_offset_window(&query), Some((10, 20)));
    }

    #[test]
    fn one_offset_missing_falls_back_to_the_filtered_page() {
        let mut query = base_query();
        query.offset_start = Some(10);
        assert_eq!(wants_offset_window(&query), None);
    }

    #[test]
    fn no_offsets_falls_back_to_the_filtered_page() {
        assert_eq!(wants_offset_window(&base_query()), None);
    }

    #[test]
    fn split_signal_keys_ignores_empty_segments() {
        let keys = split_signal_keys(Some("a,,b"));
        assert_eq!(keys, Some(vec![SignalKey::from("a".to_string()), SignalKey::from("b".to_string())]));
    }

    #[test]
    fn split_signal_keys_of_none_is_none() {
        assert_eq!(split_signal_keys(None), None);
    }

    #[test]
    fn no_deadline_context_never_fires() {
        assert!(!context_from_deadline(None).is_cancelled());
    }

    #[test]
    fn zero_deadline_is_treated_as_no_deadline() {
        assert!(!context_from_deadline(Some(0)).is_cancelled());
    }

    #[test]
    fn a_positive_deadline_is_not_immediately_cancelled() {
        assert!(!context_from_deadline(Some(60_000)).is_cancelled());
    }
}
