//! Admission, parse dispatch, panic isolation, and the per-session query surface
//! (spec.md §4.6).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tv_contracts::{FileId, SessionId, SignalKey};
use tv_model::{
    BoundaryValues, EntryPage, LogEntry, ParseSession, QueryFilters, SignalType, TimeTreeNode,
};

use crate::cancel::CancellationContext;
use crate::columnar::{ColumnarStore, ParsedStoreCatalog};
use crate::error::{EngineError, Result};
use crate::file_store::SharedRawFileStore;
use crate::intern::Interner;
use crate::parse::{self, BracketPlcParser, EntrySink, LogParser, ParserRegistry, StreamingLogParser};
use crate::progress::{ProgressPublisher, ProgressSubscriber};

use super::memory_query;
use super::merge;

/// Sessions older than this cap at a time trigger eviction of the oldest eligible completed or
/// errored session (spec.md §4.6 "Admission").
const DEFAULT_CAPACITY: usize = 10;

enum Backing {
    Pending,
    Store(Arc<ColumnarStore>),
    Memory(Vec<LogEntry>),
}

struct Slot {
    publisher: ProgressPublisher<ParseSession>,
    file_ids: Vec<FileId>,
    backing: RwLock<Backing>,
}

struct StoreSink<'a>(&'a ColumnarStore);

impl EntrySink for StoreSink<'_> {
    fn append(&mut self, entries: &[LogEntry]) -> Result<()> {
        self.0.append(entries)
    }
}

/// Wraps another [`EntrySink`], canonicalizing each entry's `device_id`/`signal_name` through a
/// process-wide [`Interner`] before forwarding the batch. The same device or signal name recurs
/// on nearly every line of a trace file; routing it through the pool means the parse holds one
/// shared allocation per distinct name rather than one per occurrence (spec.md §5, §9).
struct InterningSink<'a> {
    inner: &'a mut dyn EntrySink,
    interner: &'a Interner,
}

impl EntrySink for InterningSink<'_> {
    fn append(&mut self, entries: &[LogEntry]) -> Result<()> {
        let canonicalized: Vec<LogEntry> = entries
            .iter()
            .cloned()
            .map(|mut entry| {
                entry.device_id = self.interner.intern(&entry.device_id).to_string();
                entry.signal_name = self.interner.intern(&entry.signal_name).to_string();
                entry
            })
            .collect();
        self.inner.append(&canonicalized)
    }
}

fn canonicalize_in_place(entries: &mut [LogEntry], interner: &Interner) {
    for entry in entries {
        entry.device_id = interner.intern(&entry.device_id).to_string();
        entry.signal_name = interner.intern(&entry.signal_name).to_string();
    }
}

/// Owns every live [`ParseSession`], dispatches parses, and answers the query surface
/// (`queryEntries`, `getChunk`, etc.) against whichever backing a session ended up with
/// (spec.md §4.6).
pub struct SessionManager {
    file_store: SharedRawFileStore,
    catalog: Arc<ParsedStoreCatalog>,
    registry: ParserRegistry,
    capacity: usize,
    keep_alive: ChronoDuration,
    sessions: RwLock<HashMap<SessionId, Arc<Slot>>>,
    /// The process-wide interning pool (spec.md §5, §9), shared by every parse this manager runs
    /// rather than rebuilt per call, and reset at each parse boundary to bound residency.
    interner: Arc<Interner>,
}

impl SessionManager {
    pub fn new(file_store: SharedRawFileStore, catalog: Arc<ParsedStoreCatalog>, registry: ParserRegistry) -> Arc<Self> {
        Self::with_limits(file_store, catalog, registry, DEFAULT_CAPACITY, ChronoDuration::minutes(10))
    }

    pub fn with_limits(
        file_store: SharedRawFileStore,
        catalog: Arc<ParsedStoreCatalog>,
        registry: ParserRegistry,
        capacity: usize,
        keep_alive: ChronoDuration,
    ) -> Arc<Self> {
        Arc::new(Self {
            file_store,
            catalog,
            registry,
            capacity,
            keep_alive,
            sessions: RwLock::new(HashMap::new()),
            interner: Arc::new(Interner::new()),
        })
    }

    pub async fn start_session(self: &Arc<Self>, file_id: FileId, file_path: PathBuf) -> SessionId {
        self.start_multi_session(vec![file_id], vec![file_path]).await
    }

    pub async fn start_multi_session(self: &Arc<Self>, file_ids: Vec<FileId>, file_paths: Vec<PathBuf>) -> SessionId {
        self.admit().await;

        let session = ParseSession::new(file_ids.clone());
        let id = session.id;
        let (publisher, _) = ProgressPublisher::new(session);
        let slot = Arc::new(Slot {
            publisher,
            file_ids: file_ids.clone(),
            backing: RwLock::new(Backing::Pending),
        });
        self.sessions.write().await.insert(id, slot.clone());

        let this = self.clone();
        tokio::spawn(async move {
            this.run(id, slot, file_ids, file_paths).await;
        });
        id
    }

    /// Evicts the oldest eligible completed or errored session if at capacity. If no session is
    /// evictable, the new session is admitted anyway (spec.md §4.6 "Admission").
    async fn admit(&self) {
        let mut sessions = self.sessions.write().await;
        if sessions.len() < self.capacity {
            return;
        }
        let victim = sessions
            .iter()
            .filter(|(_, slot)| {
                let session = slot.publisher.current();
                session.is_evictable() && session.is_outside_keep_alive(self.keep_alive)
            })
            .min_by_key(|(_, slot)| slot.publisher.current().last_accessed)
            .map(|(id, _)| *id);

        if let Some(id) = victim {
            sessions.remove(&id);
            info!(session_id = %id, "evicted session to admit a new one");
        }
    }

    async fn run(self: Arc<Self>, id: SessionId, slot: Arc<Slot>, file_ids: Vec<FileId>, file_paths: Vec<PathBuf>) {
        if file_ids.len() == 1 {
            self.run_single(&slot, file_ids[0], &file_paths[0]).await;
        } else {
            self.run_merge(&slot, &file_ids, &file_paths).await;
        }
        let _ = id;
    }

    async fn run_single(self: &Arc<Self>, slot: &Arc<Slot>, file_id: FileId, path: &Path) {
        if self.catalog.is_parsed(file_id).await {
            self.close_conflicting_stores(file_id, slot).await;
            match self.catalog.open_store(file_id).await {
                Ok(Some(store)) => {
                    if self.populate_from_cached_store(slot, &store).await.is_ok() {
                        *slot.backing.write().await = Backing::Store(store);
                        return;
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(%file_id, error = %err, "failed to open cached store, falling back to parse"),
            }
        }
        self.parse_single(slot, file_id, path).await;
    }

    async fn populate_from_cached_store(&self, slot: &Arc<Slot>, store: &Arc<ColumnarStore>) -> Result<()> {
        let store = store.clone();
        let (len, signal_count) = tokio::task::spawn_blocking(move || -> Result<(u64, u64)> {
            let len = store.len()?;
            let signal_count = store.get_signals()?.len() as u64;
            Ok((len, signal_count))
        })
        .await
        .map_err(|err| EngineError::Internal(err.to_string()))??;

        let mut session = slot.publisher.current();
        session.mark_complete(len, signal_count, "cache-hit", Vec::new());
        slot.publisher.publish(session);
        Ok(())
    }

    /// Closes every other session's handle to `file_id` before this session opens it, avoiding
    /// a DuckDB lock conflict (spec.md §4.6 "File-lock resolution").
    async fn close_conflicting_stores(&self, file_id: FileId, keep: &Arc<Slot>) {
        let sessions = self.sessions.read().await;
        for other in sessions.values() {
            if Arc::ptr_eq(other, keep) {
                continue;
            }
            if other.file_ids.contains(&file_id) {
                *other.backing.write().await = Backing::Pending;
            }
        }
    }

    async fn parse_single(self: &Arc<Self>, slot: &Arc<Slot>, file_id: FileId, path: &Path) {
        let path = path.to_path_buf();
        let registry = self.registry.clone();
        let sniff_path = path.clone();
        let parser = match tokio::task::spawn_blocking(move || registry.find_parser_or_err(&sniff_path)).await {
            Ok(Ok(parser)) => parser,
            Ok(Err(err)) => return self.fail_session(slot, file_id, err.to_string()).await,
            Err(join_err) => return self.fail_session(slot, file_id, format!("parser sniff panicked: {join_err}")).await,
        };

        if parser.name() == "bracket-plc" {
            self.parse_single_streaming(slot, file_id, &path).await;
        } else {
            self.parse_single_in_memory(slot, file_id, &path, parser).await;
        }
    }

    async fn parse_single_streaming(self: &Arc<Self>, slot: &Arc<Slot>, file_id: FileId, path: &Path) {
        let store = match self.catalog.create_for_file(file_id).await {
            Ok(store) => store,
            Err(err) => return self.fail_session(slot, file_id, err.to_string()).await,
        };

        let publisher = slot.publisher.clone();
        let store_for_parse = store.clone();
        let path = path.to_path_buf();
        let interner = self.interner.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<(Vec<tv_model::ParseError>, parse::ParseSummary)> {
            let parser = BracketPlcParser;
            let mut store_sink = StoreSink(store_for_parse.as_ref());
            let mut sink = InterningSink { inner: &mut store_sink, interner: interner.as_ref() };
            let result = parser.parse_to_sink(&path, &mut sink, &mut |progress| {
                publish_progress(&publisher, progress);
            });
            store_for_parse.flush()?;
            interner.reset();
            result
        })
        .await;

        match outcome {
            Ok(Ok((errors, summary))) => {
                self.catalog.mark_complete(file_id).await;
                self.file_store.set_status(file_id, tv_model::FileStatus::Parsed).await;
                let mut session = slot.publisher.current();
                session.mark_complete(summary.entry_count, summary.signal_count, "bracket-plc", errors);
                slot.publisher.publish(session);
                *slot.backing.write().await = Backing::Store(store);
            }
            Ok(Err(err)) => {
                let _ = self.catalog.delete(file_id).await;
                self.fail_session(slot, file_id, err.to_string()).await;
            }
            Err(join_err) => {
                let _ = self.catalog.delete(file_id).await;
                self.fail_session(slot, file_id, format!("parse worker panicked: {join_err}")).await;
            }
        }
    }

    async fn parse_single_in_memory(
        self: &Arc<Self>,
        slot: &Arc<Slot>,
        file_id: FileId,
        path: &Path,
        parser: Arc<dyn LogParser>,
    ) {
        // None of the in-memory dialects implement `StreamingLogParser`; a file at or above the
        // streaming threshold would have to be materialized whole, defeating the memory
        // discipline the threshold exists to enforce (spec.md §4.3 "Memory discipline").
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() >= parse::STREAMING_THRESHOLD_BYTES => {
                return self
                    .fail_session(
                        slot,
                        file_id,
                        format!(
                            "file is {} bytes, at or above the {}-byte in-memory parse threshold, \
                             but dialect '{}' has no streaming parser",
                            meta.len(),
                            parse::STREAMING_THRESHOLD_BYTES,
                            parser.name(),
                        ),
                    )
                    .await;
            }
            Ok(_) => {}
            Err(err) => return self.fail_session(slot, file_id, err.to_string()).await,
        }

        let publisher = slot.publisher.clone();
        let path_buf = path.to_path_buf();
        let interner = self.interner.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let result = parser.parse_with_progress(&path_buf, &mut |progress| publish_progress(&publisher, progress));
            let result = result.map(|(mut entries, errors, summary)| {
                canonicalize_in_place(&mut entries, interner.as_ref());
                (entries, errors, summary)
            });
            interner.reset();
            result.map(|outcome| (outcome, parser.name()))
        })
        .await;

        let (entries, errors, summary, parser_name) = match outcome {
            Ok(Ok(((entries, errors, summary), parser_name))) => (entries, errors, summary, parser_name),
            Ok(Err(err)) => return self.fail_session(slot, file_id, err.to_string()).await,
            Err(join_err) => return self.fail_session(slot, file_id, format!("parse worker panicked: {join_err}")).await,
        };

        let store = match self.catalog.create_for_file(file_id).await {
            Ok(store) => store,
            Err(err) => return self.fail_session(slot, file_id, err.to_string()).await,
        };
        let store_for_write = store.clone();
        let write_result = tokio::task::spawn_blocking(move || -> Result<()> {
            store_for_write.append(&entries)?;
            store_for_write.flush()
        })
        .await;

        match write_result {
            Ok(Ok(())) => {
                self.catalog.mark_complete(file_id).await;
                self.file_store.set_status(file_id, tv_model::FileStatus::Parsed).await;
                let mut session = slot.publisher.current();
                session.mark_complete(summary.entry_count, summary.signal_count, parser_name, errors);
                slot.publisher.publish(session);
                *slot.backing.write().await = Backing::Store(store);
            }
            Ok(Err(err)) => {
                let _ = self.catalog.delete(file_id).await;
                self.fail_session(slot, file_id, err.to_string()).await;
            }
            Err(join_err) => {
                let _ = self.catalog.delete(file_id).await;
                self.fail_session(slot, file_id, format!("store write panicked: {join_err}")).await;
            }
        }
    }

    async fn run_merge(self: &Arc<Self>, slot: &Arc<Slot>, file_ids: &[FileId], file_paths: &[PathBuf]) {
        let mut all_entries = Vec::new();
        let mut all_errors = Vec::new();
        let total_files = file_ids.len().max(1) as f64;
        // Shared across every file in the merge so that the same device/signal name parsed from
        // two different files canonicalizes identically, which is what lets the fuzzy-window dedup
        // in `merge::merge` compare them by value below.
        let interner = self.interner.clone();

        for (index, (file_id, path)) in file_ids.iter().zip(file_paths.iter()).enumerate() {
            let registry = self.registry.clone();
            let path_buf = path.clone();
            let parser = match tokio::task::spawn_blocking(move || registry.find_parser_or_err(&path_buf)).await {
                Ok(Ok(parser)) => parser,
                Ok(Err(err)) => return self.fail_session(slot, *file_id, err.to_string()).await,
                Err(join_err) => return self.fail_session(slot, *file_id, format!("parser sniff panicked: {join_err}")).await,
            };

            let publisher = slot.publisher.clone();
            let path_buf = path.clone();
            let base_fraction = index as f64 / total_files;
            let interner_for_file = interner.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                let result = parser.parse_with_progress(&path_buf, &mut |progress| {
                    let file_fraction = if progress.total_bytes == 0 {
                        1.0
                    } else {
                        progress.bytes_read as f64 / progress.total_bytes as f64
                    };
                    let mut session = publisher.current();
                    session.set_parsing_progress(base_fraction + file_fraction / total_files);
                    publisher.publish(session);
                });
                result.map(|(mut entries, errors, summary)| {
                    canonicalize_in_place(&mut entries, interner_for_file.as_ref());
                    (entries, errors, summary)
                })
            })
            .await;

            match outcome {
                Ok(Ok((mut entries, mut errors, _))) => {
                    for entry in &mut entries {
                        entry.source_id = Some(*file_id);
                    }
                    all_entries.append(&mut entries);
                    all_errors.append(&mut errors);
                }
                Ok(Err(err)) => return self.fail_session(slot, *file_id, err.to_string()).await,
                Err(join_err) => return self.fail_session(slot, *file_id, format!("parse worker panicked: {join_err}")).await,
            }
        }
        interner.reset();

        let merged = merge::merge(all_entries);
        let signal_count = memory_query::get_signals(&merged).len() as u64;
        let entry_count = merged.len() as u64;

        let mut session = slot.publisher.current();
        session.mark_complete(entry_count, signal_count, "merged", all_errors);
        slot.publisher.publish(session);
        *slot.backing.write().await = Backing::Memory(merged);
    }

    async fn fail_session(&self, slot: &Arc<Slot>, file_id: FileId, reason: String) {
        error!(%file_id, %reason, "session parse failed");
        let mut session = slot.publisher.current();
        session.mark_error(reason);
        slot.publisher.publish(session);
    }

    pub async fn get_session(&self, id: SessionId) -> Option<ParseSession> {
        self.sessions.read().await.get(&id).map(|slot| slot.publisher.current())
    }

    pub async fn subscribe(&self, id: SessionId) -> Option<ProgressSubscriber<ParseSession>> {
        self.sessions.read().await.get(&id).map(|slot| slot.publisher.subscribe())
    }

    pub async fn touch_session(&self, id: SessionId) {
        if let Some(slot) = self.sessions.read().await.get(&id) {
            let mut session = slot.publisher.current();
            session.touch();
            slot.publisher.publish(session);
        }
    }

    async fn slot(&self, id: SessionId) -> Result<Arc<Slot>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("session", id.to_string()))
    }

    /// Runs a store-backed read through `spawn_blocking`, racing it against `ctx` so a
    /// cancelled/expired context abandons the result promptly instead of waiting on DuckDB
    /// (spec.md §5, §6).
    async fn run_blocking<T, F>(ctx: &CancellationContext, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        ctx.check()?;
        ctx.race(async move { tokio::task::spawn_blocking(f).await.map_err(|err| EngineError::Internal(err.to_string()))? }).await
    }

    pub async fn query_entries(&self, ctx: &CancellationContext, id: SessionId, filters: QueryFilters, page: u64, page_size: u64) -> Result<EntryPage> {
        let slot = self.slot(id).await?;
        let backing = slot.backing.read().await;
        let (entries, total_matching) = match &*backing {
            Backing::Store(store) => {
                let store = store.clone();
                let filters = filters.clone();
                Self::run_blocking(ctx, move || store.query_entries(&filters, page, page_size)).await?
            }
            Backing::Memory(entries) => {
                ctx.check()?;
                memory_query::query_entries(entries, &filters, page, page_size)
            }
            Backing::Pending => return Err(EngineError::not_found("session backing", id.to_string())),
        };
        Ok(EntryPage { entries, total_matching, page, page_size })
    }

    pub async fn get_entries(&self, ctx: &CancellationContext, id: SessionId, offset_start: u64, offset_end_exclusive: u64) -> Result<Vec<LogEntry>> {
        let slot = self.slot(id).await?;
        let backing = slot.backing.read().await;
        match &*backing {
            Backing::Store(store) => {
                let store = store.clone();
                Self::run_blocking(ctx, move || store.get_entries(offset_start, offset_end_exclusive)).await
            }
            Backing::Memory(entries) => {
                ctx.check()?;
                Ok(memory_query::get_entries(entries, offset_start, offset_end_exclusive))
            }
            Backing::Pending => Err(EngineError::not_found("session backing", id.to_string())),
        }
    }

    pub async fn get_chunk(
        &self,
        ctx: &CancellationContext,
        id: SessionId,
        start_ts: i64,
        end_ts: i64,
        signal_keys: Option<Vec<SignalKey>>,
    ) -> Result<Vec<LogEntry>> {
        let slot = self.slot(id).await?;
        let backing = slot.backing.read().await;
        match &*backing {
            Backing::Store(store) => {
                let store = store.clone();
                Self::run_blocking(ctx, move || store.get_chunk(start_ts, end_ts, signal_keys.as_deref())).await
            }
            Backing::Memory(entries) => {
                ctx.check()?;
                Ok(memory_query::get_chunk(entries, start_ts, end_ts, signal_keys.as_deref()))
            }
            Backing::Pending => Err(EngineError::not_found("session backing", id.to_string())),
        }
    }

    pub async fn get_values_at_time(
        &self,
        ctx: &CancellationContext,
        id: SessionId,
        ts: i64,
        signal_keys: Option<Vec<SignalKey>>,
    ) -> Result<Vec<LogEntry>> {
        let slot = self.slot(id).await?;
        let backing = slot.backing.read().await;
        match &*backing {
            Backing::Store(store) => {
                let store = store.clone();
                Self::run_blocking(ctx, move || store.get_values_at_time(ts, signal_keys.as_deref())).await
            }
            Backing::Memory(entries) => {
                ctx.check()?;
                Ok(memory_query::get_values_at_time(entries, ts, signal_keys.as_deref()))
            }
            Backing::Pending => Err(EngineError::not_found("session backing", id.to_string())),
        }
    }

    pub async fn get_boundary_values(
        &self,
        ctx: &CancellationContext,
        id: SessionId,
        start_ts: i64,
        end_ts: i64,
        signal_keys: Vec<SignalKey>,
    ) -> Result<BoundaryValues> {
        let slot = self.slot(id).await?;
        let backing = slot.backing.read().await;
        match &*backing {
            Backing::Store(store) => {
                let store = store.clone();
                Self::run_blocking(ctx, move || store.get_boundary_values(start_ts, end_ts, &signal_keys)).await
            }
            Backing::Memory(entries) => {
                ctx.check()?;
                Ok(memory_query::get_boundary_values(entries, start_ts, end_ts, &signal_keys))
            }
            Backing::Pending => Err(EngineError::not_found("session backing", id.to_string())),
        }
    }

    pub async fn get_index_by_time(&self, ctx: &CancellationContext, id: SessionId, filters: QueryFilters, ts: i64) -> Result<i64> {
        let slot = self.slot(id).await?;
        let backing = slot.backing.read().await;
        match &*backing {
            Backing::Store(store) => {
                let store = store.clone();
                Self::run_blocking(ctx, move || store.get_index_by_time(&filters, ts)).await
            }
            Backing::Memory(entries) => {
                ctx.check()?;
                Ok(memory_query::get_index_by_time(entries, &filters, ts))
            }
            Backing::Pending => Err(EngineError::not_found("session backing", id.to_string())),
        }
    }

    pub async fn get_time_tree(&self, ctx: &CancellationContext, id: SessionId, filters: QueryFilters) -> Result<Vec<TimeTreeNode>> {
        let slot = self.slot(id).await?;
        let backing = slot.backing.read().await;
        match &*backing {
            Backing::Store(store) => {
                let store = store.clone();
                Self::run_blocking(ctx, move || store.get_time_tree(&filters)).await
            }
            Backing::Memory(entries) => {
                ctx.check()?;
                Ok(memory_query::get_time_tree(entries, &filters))
            }
            Backing::Pending => Err(EngineError::not_found("session backing", id.to_string())),
        }
    }

    pub async fn get_signals(&self, ctx: &CancellationContext, id: SessionId) -> Result<Vec<SignalKey>> {
        let slot = self.slot(id).await?;
        let backing = slot.backing.read().await;
        match &*backing {
            Backing::Store(store) => {
                let store = store.clone();
                Self::run_blocking(ctx, move || store.get_signals()).await
            }
            Backing::Memory(entries) => {
                ctx.check()?;
                Ok(memory_query::get_signals(entries))
            }
            Backing::Pending => Err(EngineError::not_found("session backing", id.to_string())),
        }
    }

    pub async fn get_signal_types(&self, ctx: &CancellationContext, id: SessionId) -> Result<HashMap<String, SignalType>> {
        let slot = self.slot(id).await?;
        let backing = slot.backing.read().await;
        match &*backing {
            Backing::Store(store) => {
                let store = store.clone();
                Self::run_blocking(ctx, move || store.get_signal_types()).await
            }
            Backing::Memory(entries) => {
                ctx.check()?;
                Ok(memory_query::get_signal_types(entries))
            }
            Backing::Pending => Err(EngineError::not_found("session backing", id.to_string())),
        }
    }

    pub async fn get_categories(&self, ctx: &CancellationContext, id: SessionId) -> Result<Vec<String>> {
        let slot = self.slot(id).await?;
        let backing = slot.backing.read().await;
        match &*backing {
            Backing::Store(store) => {
                let store = store.clone();
                Self::run_blocking(ctx, move || store.get_categories()).await
            }
            Backing::Memory(entries) => {
                ctx.check()?;
                Ok(memory_query::get_categories(entries))
            }
            Backing::Pending => Err(EngineError::not_found("session backing", id.to_string())),
        }
    }

    /// Removes completed/errored sessions whose last access is older than `max_age`.
    pub async fn cleanup_old_sessions(&self, max_age: ChronoDuration) -> usize {
        let mut sessions = self.sessions.write().await;
        let stale: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, slot)| {
                let session = slot.publisher.current();
                session.is_evictable() && session.is_outside_keep_alive(max_age)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            sessions.remove(id);
        }
        stale.len()
    }

    /// Removes the parsed store for `file_id` and drops every session backed by it.
    pub async fn delete_parsed_file(&self, file_id: FileId) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, slot| !slot.file_ids.contains(&file_id));
        drop(sessions);
        self.catalog.delete(file_id).await
    }
}

fn publish_progress(publisher: &ProgressPublisher<ParseSession>, progress: parse::ParseProgress) {
    let fraction = if progress.total_bytes == 0 {
        1.0
    } else {
        progress.bytes_read as f64 / progress.total_bytes as f64
    };
    let mut session = publisher.current();
    session.set_parsing_progress(fraction);
    session.entry_count = progress.lines_processed;
    publisher.publish(session);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tv_model::SignalValue;

    async fn manager() -> (Arc<SessionManager>, SharedRawFileStore, tempfile::TempDir, tempfile::TempDir) {
        let raw_dir = tempfile::tempdir().unwrap();
        let catalog_dir = tempfile::tempdir().unwrap();
        let file_store = Arc::new(crate::file_store::RawFileStore::open(raw_dir.path()).await.unwrap());
        let catalog = Arc::new(ParsedStoreCatalog::open(catalog_dir.path()).await.unwrap());
        let manager = SessionManager::new(file_store.clone(), catalog, parse::default_registry());
        (manager, file_store, raw_dir, catalog_dir)
    }

    async fn wait_for_terminal(manager: &SessionManager, id: SessionId) -> ParseSession {
        let mut sub = manager.subscribe(id).await.unwrap();
        let mut session = sub.current();
        while !matches!(session.status, tv_model::SessionStatus::Complete | tv_model::SessionStatus::Error) {
            session = sub.changed().await.unwrap();
        }
        session
    }

    #[tokio::test]
    async fn parses_a_bracket_plc_file_through_the_streaming_path() {
        let (manager, file_store, _raw_dir, _catalog_dir) = manager().await;
        let info = file_store
            .save(
                "trace.log",
                b"2024-01-01 00:00:00.000 [INFO] [SYS/DEV-1] [key:Running] (Boolean) : true\n",
            )
            .await
            .unwrap();

        let path = file_store.get_file_path(info.id);
        let session_id = manager.start_session(info.id, path).await;
        let session = wait_for_terminal(&manager, session_id).await;

        assert_eq!(session.status, tv_model::SessionStatus::Complete);
        assert_eq!(session.entry_count, 1);

        let ctx = CancellationContext::none();
        let page = manager.query_entries(&ctx, session_id, QueryFilters::default(), 0, 10).await.unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].value, SignalValue::Boolean(true));
    }

    #[tokio::test]
    async fn unreadable_file_marks_the_session_as_errored() {
        let (manager, file_store, _raw_dir, _catalog_dir) = manager().await;
        let missing_id = FileId::new();
        let path = file_store.get_file_path(missing_id);

        let session_id = manager.start_session(missing_id, path).await;
        let session = wait_for_terminal(&manager, session_id).await;
        assert_eq!(session.status, tv_model::SessionStatus::Error);
    }

    #[tokio::test]
    async fn a_cancelled_context_fails_a_store_backed_query_without_a_result() {
        let (manager, file_store, _raw_dir, _catalog_dir) = manager().await;
        let info = file_store
            .save(
                "trace.log",
                b"2024-01-01 00:00:00.000 [INFO] [SYS/DEV-1] [key:Running] (Boolean) : true\n",
            )
            .await
            .unwrap();
        let path = file_store.get_file_path(info.id);
        let session_id = manager.start_session(info.id, path).await;
        wait_for_terminal(&manager, session_id).await;

        let ctx = CancellationContext::none();
        ctx.cancel();
        let result = manager.query_entries(&ctx, session_id, QueryFilters::default(), 0, 10).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn file_at_or_above_the_streaming_threshold_fails_a_non_streaming_dialect() {
        let (manager, file_store, _raw_dir, _catalog_dir) = manager().await;
        // tab-plc has no streaming parser; pad the file past the threshold with trailing
        // whitespace after an otherwise-valid header + data row so the parser still recognizes
        // the dialect during sniffing.
        let mut body = b"timestamp\tdevice\tsignal\tvalue\n2024-01-01 00:00:00.000\tDEV-1\tRunning\ttrue\n".to_vec();
        body.extend(std::iter::repeat(b' ').take(parse::STREAMING_THRESHOLD_BYTES as usize));
        let info = file_store.save("trace.tsv", &body).await.unwrap();
        let path = file_store.get_file_path(info.id);

        let session_id = manager.start_session(info.id, path).await;
        let session = wait_for_terminal(&manager, session_id).await;
        assert_eq!(session.status, tv_model::SessionStatus::Error);
    }
}
