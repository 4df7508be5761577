//! Concurrency-bounded façade over [`crate::session::SessionManager`]'s read surface
//! (spec.md §4.7 "Resource bounds").
//!
//! Heavy reads (`queryEntries`, `getChunk`, `getTimeTree`) scan or aggregate across a whole
//! store; an unbounded client could run enough of them at once to starve the DuckDB connection
//! mutex for every other session. A semaphore caps how many of those run concurrently, independent
//! of how many sessions or HTTP connections exist. Cheap point reads (`getSignals`,
//! `getValuesAtTime`, ...) bypass the semaphore entirely.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tv_contracts::{SessionId, SignalKey};
use tv_model::{BoundaryValues, EntryPage, LogEntry, QueryFilters, SignalType, TimeTreeNode};

use crate::cancel::CancellationContext;
use crate::error::Result;
use crate::session::SessionManager;

/// At most this many heavy (full-scan or aggregate) queries run at once, across every session
/// (spec.md §4.7 "Resource bounds").
const DEFAULT_HEAVY_QUERY_PERMITS: usize = 3;

/// Wraps a [`SessionManager`] with a semaphore limiting concurrent heavy queries. One instance is
/// shared process-wide, the same way one [`crate::columnar::ParsedStoreCatalog`] is.
pub struct QueryExecutor {
    sessions: Arc<SessionManager>,
    heavy: Semaphore,
}

impl QueryExecutor {
    pub fn new(sessions: Arc<SessionManager>) -> Arc<Self> {
        Self::with_heavy_permits(sessions, DEFAULT_HEAVY_QUERY_PERMITS)
    }

    pub fn with_heavy_permits(sessions: Arc<SessionManager>, heavy_permits: usize) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            heavy: Semaphore::new(heavy_permits),
        })
    }

    /// Waits for a heavy-query permit, itself subject to `ctx` — a query queued up behind other
    /// heavy reads can be cancelled or time out before it ever gets to run (spec.md §5, §6).
    async fn acquire_heavy(&self, ctx: &CancellationContext) -> Result<tokio::sync::SemaphorePermit<'_>> {
        ctx.check()?;
        ctx.race(async { Ok(self.heavy.acquire().await.expect("semaphore never closed")) }).await
    }

    pub async fn query_entries(
        &self,
        ctx: &CancellationContext,
        id: SessionId,
        filters: QueryFilters,
        page: u64,
        page_size: u64,
    ) -> Result<EntryPage> {
        let _permit = self.acquire_heavy(ctx).await?;
        self.sessions.query_entries(ctx, id, filters, page, page_size).await
    }

    pub async fn get_chunk(
        &self,
        ctx: &CancellationContext,
        id: SessionId,
        start_ts: i64,
        end_ts: i64,
        signal_keys: Option<Vec<SignalKey>>,
    ) -> Result<Vec<LogEntry>> {
        let _permit = self.acquire_heavy(ctx).await?;
        self.sessions.get_chunk(ctx, id, start_ts, end_ts, signal_keys).await
    }

    pub async fn get_time_tree(&self, ctx: &CancellationContext, id: SessionId, filters: QueryFilters) -> Result<Vec<TimeTreeNode>> {
        let _permit = self.acquire_heavy(ctx).await?;
        self.sessions.get_time_tree(ctx, id, filters).await
    }

    pub async fn get_entries(
        &self,
        ctx: &CancellationContext,
        id: SessionId,
        offset_start: u64,
        offset_end_exclusive: u64,
    ) -> Result<Vec<LogEntry>> {
        self.sessions.get_entries(ctx, id, offset_start, offset_end_exclusive).await
    }

    pub async fn get_values_at_time(
        &self,
        ctx: &CancellationContext,
        id: SessionId,
        ts: i64,
        signal_keys: Option<Vec<SignalKey>>,
    ) -> Result<Vec<LogEntry>> {
        self.sessions.get_values_at_time(ctx, id, ts, signal_keys).await
    }

    pub async fn get_boundary_values(
        &self,
        ctx: &CancellationContext,
        id: SessionId,
        start_ts: i64,
        end_ts: i64,
        signal_keys: Vec<SignalKey>,
    ) -> Result<BoundaryValues> {
        self.sessions.get_boundary_values(ctx, id, start_ts, end_ts, signal_keys).await
    }

    pub async fn get_index_by_time(&self, ctx: &CancellationContext, id: SessionId, filters: QueryFilters, ts: i64) -> Result<i64> {
        self.sessions.get_index_by_time(ctx, id, filters, ts).await
    }

    pub async fn get_signals(&self, ctx: &CancellationContext, id: SessionId) -> Result<Vec<SignalKey>> {
        self.sessions.get_signals(ctx, id).await
    }

    pub async fn get_signal_types(&self, ctx: &CancellationContext, id: SessionId) -> Result<std::collections::HashMap<String, SignalType>> {
        self.sessions.get_signal_types(ctx, id).await
    }

    pub async fn get_categories(&self, ctx: &CancellationContext, id: SessionId) -> Result<Vec<String>> {
        self.sessions.get_categories(ctx, id).await
    }

    /// Number of heavy-query permits currently free; exposed for health/metrics endpoints.
    pub fn available_heavy_permits(&self) -> usize {
        self.heavy.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columnar::ParsedStoreCatalog;
    use crate::error::EngineError;
    use crate::file_store::RawFileStore;
    use crate::parse;

    async fn executor() -> (Arc<QueryExecutor>, Arc<RawFileStore>) {
        let raw_dir = tempfile::tempdir().unwrap();
        let catalog_dir = tempfile::tempdir().unwrap();
        let file_store = Arc::new(RawFileStore::open(raw_dir.path()).await.unwrap());
        let catalog = Arc::new(ParsedStoreCatalog::open(catalog_dir.path()).await.unwrap());
        let sessions = SessionManager::new(file_store.clone(), catalog, parse::default_registry());
        (QueryExecutor::new(sessions), file_store)
    }

    #[tokio::test]
    async fn a_fresh_executor_has_all_heavy_permits_free() {
        let (executor, _file_store) = executor().await;
        assert_eq!(executor.available_heavy_permits(), DEFAULT_HEAVY_QUERY_PERMITS);
    }

    #[tokio::test]
    async fn heavy_query_against_an_unknown_session_still_releases_its_permit() {
        let (executor, _file_store) = executor().await;
        let missing = SessionId::new();
        let result = executor.query_entries(&CancellationContext::none(), missing, QueryFilters::default(), 0, 10).await;
        assert!(result.is_err());
        assert_eq!(executor.available_heavy_permits(), DEFAULT_HEAVY_QUERY_PERMITS);
    }

    #[tokio::test]
    async fn an_already_cancelled_context_fails_before_taking_a_permit() {
        let (executor, _file_store) = executor().await;
        let ctx = CancellationContext::none();
        ctx.cancel();
        let result = executor.query_entries(&ctx, SessionId::new(), QueryFilters::default(), 0, 10).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(executor.available_heavy_permits(), DEFAULT_HEAVY_QUERY_PERMITS);
    }
}
