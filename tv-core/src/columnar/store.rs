//! The per-file (or per-merged-session) columnar entry store, backed by an embedded DuckDB
//! database (spec.md §4.4).
//!
//! Every method here is a blocking, synchronous call against the underlying connection; callers
//! on the async side are expected to run them through `tokio::task::spawn_blocking`, the same way
//! the upload manager isolates [`crate::upload::gzip::decompress_blocking`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use duckdb::{AccessMode, Config, Connection, Row};
use parking_lot::RwLock as SyncRwLock;
use tracing::{debug, info};
use tv_contracts::SignalKey;
use tv_model::{BoundaryValues, LogEntry, QueryFilters, SignalType, SignalValue, TimeTreeNode};

use crate::error::{EngineError, Result};

use super::filtering::{build_order_by, build_where};

/// Appends are buffered in memory and flushed to the DuckDB appender in batches of this size
/// (spec.md §4.4 `append`).
const APPEND_BATCH_SIZE: usize = 50_000;

/// Pages whose starting offset is at or beyond this many rows resolve via a keyset cursor rather
/// than `OFFSET`, per spec.md §4.4 "deep pages".
const KEYSET_OFFSET_THRESHOLD: u64 = 5_000;

const CREATE_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS entries (
    seq BIGINT,
    ts BIGINT,
    device_id VARCHAR,
    signal_name VARCHAR,
    value VARCHAR,
    signal_type VARCHAR,
    category VARCHAR,
    line_number UBIGINT,
    raw_line VARCHAR,
    source_id VARCHAR
);
CREATE INDEX IF NOT EXISTS entries_ts_idx ON entries (ts);
CREATE INDEX IF NOT EXISTS entries_device_signal_idx ON entries (device_id, signal_name);
";

/// One store corresponds to one raw file, or one merged multi-file session (spec.md §4.4).
pub struct ColumnarStore {
    conn: Mutex<Connection>,
    path: PathBuf,
    next_seq: SyncRwLock<u64>,
    pending: Mutex<Vec<LogEntry>>,
}

impl std::fmt::Debug for ColumnarStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnarStore").field("path", &self.path).finish()
    }
}

impl ColumnarStore {
    /// Creates (or truncates) a writable store at `path`. Fails if another handle already holds
    /// the file open for write — the session manager is responsible for resolving that conflict
    /// before calling this (spec.md §4.4 "Persistence", §4.6 "File-lock resolution").
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conn = Connection::open(&path).map_err(|err| match err {
            duckdb::Error::DuckDBFailure(..) => EngineError::Locked(path.display().to_string()),
            other => EngineError::Store(other),
        })?;
        conn.execute_batch(CREATE_TABLE_SQL)?;
        info!(path = %path.display(), "created columnar store");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
            next_seq: SyncRwLock::new(0),
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Opens an existing store read-only. Used by the catalog's fast path once a file is known
    /// parsed (spec.md §4.4 "Persistence").
    pub fn open_read_only(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(&path, config)?;
        let next_seq = {
            let mut stmt = conn.prepare("SELECT COALESCE(MAX(seq), -1) + 1 FROM entries")?;
            stmt.query_row([], |row| row.get::<_, i64>(0))? as u64
        };
        Ok(Self {
            conn: Mutex::new(conn),
            path,
            next_seq: SyncRwLock::new(next_seq),
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffers `entries`, flushing to the DuckDB appender once [`APPEND_BATCH_SIZE`] rows have
    /// accumulated. Call [`ColumnarStore::flush`] to force a final write at end of parse.
    /// Order of appends is preserved via the monotonic `seq` column (spec.md §4.4 `append`).
    pub fn append(&self, entries: &[LogEntry]) -> Result<()> {
        let mut pending = self.pending.lock().unwrap();
        pending.extend_from_slice(entries);
        if pending.len() >= APPEND_BATCH_SIZE {
            let batch = std::mem::take(&mut *pending);
            drop(pending);
            self.flush_batch(&batch)?;
        }
        Ok(())
    }

    /// Forces any buffered rows out to storage. Must be called after the last `append` of a
    /// parse.
    pub fn flush(&self) -> Result<()> {
        let batch = std::mem::take(&mut *self.pending.lock().unwrap());
        if batch.is_empty() {
            return Ok(());
        }
        self.flush_batch(&batch)
    }

    fn flush_batch(&self, batch: &[LogEntry]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut appender = conn.appender("entries")?;
        let mut seq_guard = self.next_seq.write();
        for entry in batch {
            let signal_type = entry.signal_type();
            appender.append_row(duckdb::params![
                *seq_guard as i64,
                entry.timestamp_millis,
                entry.device_id,
                entry.signal_name,
                entry.value.to_storage_string(),
                signal_type.label(),
                entry.category,
                entry.line_number,
                entry.raw_line,
                entry.source_id.map(|id| id.to_string()),
            ])?;
            *seq_guard += 1;
        }
        appender.flush()?;
        debug!(rows = batch.len(), "flushed entry batch");
        Ok(())
    }

    pub fn len(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM entries")?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Positional window read: rows `[offset_start, offset_end_exclusive)` in append order.
    pub fn get_entries(&self, offset_start: u64, offset_end_exclusive: u64) -> Result<Vec<LogEntry>> {
        let limit = offset_end_exclusive.saturating_sub(offset_start);
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT seq, ts, device_id, signal_name, value, signal_type, category, line_number, raw_line, source_id
             FROM entries ORDER BY seq LIMIT ? OFFSET ?",
        )?;
        let rows = stmt.query_map(duckdb::params![limit, offset_start], row_to_entry)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(EngineError::from)
    }

    /// Filtered, paginated read. Deep pages (`page * page_size >= `[`KEYSET_OFFSET_THRESHOLD`])
    /// resolve via a keyset cursor on the active sort's leading column rather than `OFFSET`
    /// (spec.md §4.4 `queryEntries`, §4.7 "Pagination").
    pub fn query_entries(
        &self,
        filters: &QueryFilters,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<LogEntry>, u64)> {
        let where_clause = build_where(filters);
        let order_by = build_order_by(filters);
        let offset = page.saturating_mul(page_size);

        let conn = self.conn.lock().unwrap();

        let (base_source, changed_predicate) = changed_only_source(filters.changed_only);

        let total_sql = format!(
            "SELECT COUNT(*) FROM {base_source} t WHERE {changed_predicate} AND ({where_pred})",
            where_pred = if where_clause.predicate.is_empty() { "TRUE".to_string() } else { where_clause.predicate.clone() },
        );
        let total_matching: i64 = {
            let mut stmt = conn.prepare(&total_sql)?;
            stmt.query_row(duckdb::params_from_iter(where_clause.params.iter()), |row| row.get(0))?
        };

        let columns = "seq, ts, device_id, signal_name, value, signal_type, category, line_number, raw_line, source_id";
        let entries = if offset >= KEYSET_OFFSET_THRESHOLD {
            self.query_entries_keyset(&conn, base_source, &where_clause, changed_predicate, &order_by, offset, page_size, columns)?
        } else {
            let sql = format!(
                "SELECT {columns} FROM {base_source} t WHERE {changed_predicate} AND ({where_pred}) {order_by} LIMIT ? OFFSET ?",
                where_pred = if where_clause.predicate.is_empty() { "TRUE".to_string() } else { where_clause.predicate.clone() },
            );
            let mut params = where_clause.params.clone();
            params.push(duckdb::types::Value::BigInt(page_size as i64));
            params.push(duckdb::types::Value::BigInt(offset as i64));
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(duckdb::params_from_iter(params.iter()), row_to_entry)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        Ok((entries, total_matching as u64))
    }

    #[allow(clippy::too_many_arguments)]
    fn query_entries_keyset(
        &self,
        conn: &Connection,
        base_source: &str,
        where_clause: &super::filtering::FilterClause,
        changed_predicate: &str,
        order_by: &str,
        offset: u64,
        page_size: u64,
        columns: &str,
    ) -> Result<Vec<LogEntry>> {
        let where_pred = if where_clause.predicate.is_empty() { "TRUE".to_string() } else { where_clause.predicate.clone() };
        // Resolve the cursor's leading sort key by skipping to `offset` once, cheaply, as a
        // single indexed scan, then seek from there — avoids re-scanning `offset` rows per page.
        let cursor_sql = format!(
            "SELECT ts, seq FROM {base_source} t WHERE {changed_predicate} AND ({where_pred}) {order_by} LIMIT 1 OFFSET ?"
        );
        let mut cursor_params = where_clause.params.clone();
        cursor_params.push(duckdb::types::Value::BigInt(offset as i64));
        let cursor: Option<(i64, i64)> = {
            let mut stmt = conn.prepare(&cursor_sql)?;
            stmt.query_row(duckdb::params_from_iter(cursor_params.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .ok()
        };
        let Some((cursor_ts, cursor_seq)) = cursor else {
            return Ok(Vec::new());
        };

        let seek_sql = format!(
            "SELECT {columns} FROM {base_source} t WHERE {changed_predicate} AND ({where_pred}) AND (ts, seq) >= (?, ?) {order_by} LIMIT ?"
        );
        let mut seek_params = where_clause.params.clone();
        seek_params.push(duckdb::types::Value::BigInt(cursor_ts));
        seek_params.push(duckdb::types::Value::BigInt(cursor_seq));
        seek_params.push(duckdb::types::Value::BigInt(page_size as i64));
        let mut stmt = conn.prepare(&seek_sql)?;
        let rows = stmt.query_map(duckdb::params_from_iter(seek_params.iter()), row_to_entry)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Time-range read, optionally restricted to a set of `deviceId::signalName` keys
    /// (spec.md §4.4 `getChunk`).
    pub fn get_chunk(&self, start_ts: i64, end_ts: i64, signal_keys: Option<&[SignalKey]>) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = "SELECT seq, ts, device_id, signal_name, value, signal_type, category, line_number, raw_line, source_id
                        FROM entries WHERE ts >= ? AND ts <= ?".to_string();
        let mut params: Vec<duckdb::types::Value> = vec![
            duckdb::types::Value::BigInt(start_ts),
            duckdb::types::Value::BigInt(end_ts),
        ];
        append_signal_key_predicate(&mut sql, &mut params, signal_keys);
        sql.push_str(" ORDER BY ts, seq");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params_from_iter(params.iter()), row_to_entry)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// For each signal (optionally restricted to `signal_keys`), the most recent entry with
    /// `timestamp <= ts` (spec.md §4.4 `getValuesAtTime`).
    pub fn get_values_at_time(&self, ts: i64, signal_keys: Option<&[SignalKey]>) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = "SELECT seq, ts, device_id, signal_name, value, signal_type, category, line_number, raw_line, source_id FROM (
                SELECT *, ROW_NUMBER() OVER (PARTITION BY device_id, signal_name ORDER BY ts DESC, seq DESC) AS rn
                FROM entries WHERE ts <= ?"
            .to_string();
        let mut params: Vec<duckdb::types::Value> = vec![duckdb::types::Value::BigInt(ts)];
        append_signal_key_predicate(&mut sql, &mut params, signal_keys);
        sql.push_str(") WHERE rn = 1");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params_from_iter(params.iter()), row_to_entry)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// The last entry strictly before `start_ts` and the first entry strictly after `end_ts`,
    /// per signal (spec.md §4.4 `getBoundaryValues`).
    pub fn get_boundary_values(&self, start_ts: i64, end_ts: i64, signal_keys: &[SignalKey]) -> Result<BoundaryValues> {
        let before = self.boundary_side(start_ts, signal_keys, true)?;
        let after = self.boundary_side(end_ts, signal_keys, false)?;
        Ok(BoundaryValues { before, after })
    }

    fn boundary_side(&self, boundary_ts: i64, signal_keys: &[SignalKey], strictly_before: bool) -> Result<HashMap<String, LogEntry>> {
        let conn = self.conn.lock().unwrap();
        let (comparator, order_dir) = if strictly_before { ("<", "DESC") } else { (">", "ASC") };
        let mut sql = format!(
            "SELECT seq, ts, device_id, signal_name, value, signal_type, category, line_number, raw_line, source_id FROM (
                SELECT *, ROW_NUMBER() OVER (PARTITION BY device_id, signal_name ORDER BY ts {order_dir}, seq {order_dir}) AS rn
                FROM entries WHERE ts {comparator} ?"
        );
        let mut params: Vec<duckdb::types::Value> = vec![duckdb::types::Value::BigInt(boundary_ts)];
        append_signal_key_predicate(&mut sql, &mut params, Some(signal_keys));
        sql.push_str(") WHERE rn = 1");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params_from_iter(params.iter()), row_to_entry)?;
        let mut map = HashMap::new();
        for entry in rows {
            let entry = entry?;
            map.insert(entry.signal_key().to_string(), entry);
        }
        Ok(map)
    }

    /// The 0-based rank of the first filtered row whose timestamp is `>= ts`, or `-1` if none
    /// (spec.md §4.4 `getIndexByTime`). Must stay consistent with `query_entries` under the same
    /// filter (spec.md:165), so it applies the same `changed_only` CTE swap.
    pub fn get_index_by_time(&self, filters: &QueryFilters, ts: i64) -> Result<i64> {
        let where_clause = build_where(filters);
        let order_by = build_order_by(filters);
        let (base_source, changed_predicate) = changed_only_source(filters.changed_only);
        let conn = self.conn.lock().unwrap();

        let where_pred = if where_clause.predicate.is_empty() { "TRUE".to_string() } else { where_clause.predicate };
        let sql = format!(
            "SELECT rank FROM (
                SELECT ts, ROW_NUMBER() OVER ({order_by}) - 1 AS rank FROM {base_source} t
                WHERE {changed_predicate} AND ({where_pred})
            ) WHERE ts >= ? ORDER BY rank LIMIT 1"
        );
        let mut params = where_clause.params;
        params.push(duckdb::types::Value::BigInt(ts));
        let mut stmt = conn.prepare(&sql)?;
        let rank: Option<i64> = stmt
            .query_row(duckdb::params_from_iter(params.iter()), |row| row.get(0))
            .ok();
        Ok(rank.unwrap_or(-1))
    }

    /// Distinct date/hour/minute triples present in the filtered set, each carrying the earliest
    /// timestamp within that minute (spec.md §4.4 `getTimeTree`). Applies the same `changed_only`
    /// CTE swap as `query_entries` so both stay consistent under the same filter.
    pub fn get_time_tree(&self, filters: &QueryFilters) -> Result<Vec<TimeTreeNode>> {
        let where_clause = build_where(filters);
        let (base_source, changed_predicate) = changed_only_source(filters.changed_only);
        let conn = self.conn.lock().unwrap();
        let where_pred = if where_clause.predicate.is_empty() { "TRUE".to_string() } else { where_clause.predicate };
        let sql = format!(
            "SELECT
                strftime(to_timestamp(ts / 1000), '%Y-%m-%d') AS date,
                CAST(date_part('hour', to_timestamp(ts / 1000)) AS INTEGER) AS hour,
                CAST(date_part('minute', to_timestamp(ts / 1000)) AS INTEGER) AS minute,
                MIN(ts) AS first_ts
             FROM {base_source} t WHERE {changed_predicate} AND ({where_pred})
             GROUP BY date, hour, minute
             ORDER BY first_ts"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params_from_iter(where_clause.params.iter()), |row| {
            Ok(TimeTreeNode {
                date: row.get(0)?,
                hour: row.get::<_, i32>(1)? as u8,
                minute: row.get::<_, i32>(2)? as u8,
                first_ts: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn get_signals(&self) -> Result<Vec<SignalKey>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT device_id, signal_name FROM entries ORDER BY device_id, signal_name")?;
        let rows = stmt.query_map([], |row| {
            let device_id: String = row.get(0)?;
            let signal_name: String = row.get(1)?;
            Ok(SignalKey::new(&device_id, &signal_name))
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn get_signal_types(&self) -> Result<HashMap<String, SignalType>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT device_id, signal_name, signal_type FROM entries",
        )?;
        let rows = stmt.query_map([], |row| {
            let device_id: String = row.get(0)?;
            let signal_name: String = row.get(1)?;
            let signal_type: String = row.get(2)?;
            Ok((SignalKey::new(&device_id, &signal_name).to_string(), label_to_signal_type(&signal_type)))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (key, signal_type) = row?;
            map.insert(key, signal_type);
        }
        Ok(map)
    }

    pub fn get_categories(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT category FROM entries WHERE category IS NOT NULL ORDER BY category")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn get_time_range(&self) -> Result<Option<(i64, i64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT MIN(ts), MAX(ts) FROM entries")?;
        let range: (Option<i64>, Option<i64>) = stmt.query_row([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(match range {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        })
    }
}

/// The `FROM` source and its accompanying predicate for `filters.changed_only`: a window-function
/// CTE exposing each row's previous value per signal, filtered down to rows where the value
/// actually changed. Shared by every read that honors `changed_only` so they stay consistent with
/// each other under the same filter (spec.md:165).
fn changed_only_source(changed_only: bool) -> (&'static str, &'static str) {
    if changed_only {
        (
            "(SELECT *, LAG(value) OVER (PARTITION BY device_id, signal_name ORDER BY ts, seq) AS prev_value FROM entries)",
            "(prev_value IS NULL OR prev_value != value)",
        )
    } else {
        ("entries", "TRUE")
    }
}

fn label_to_signal_type(label: &str) -> SignalType {
    match label {
        "boolean" => SignalType::Boolean,
        "integer" => SignalType::Integer,
        _ => SignalType::String,
    }
}

fn append_signal_key_predicate(sql: &mut String, params: &mut Vec<duckdb::types::Value>, signal_keys: Option<&[SignalKey]>) {
    let Some(keys) = signal_keys else { return };
    if keys.is_empty() {
        sql.push_str(" AND FALSE");
        return;
    }
    let placeholders = vec!["(device_id = ? AND signal_name = ?)"; keys.len()].join(" OR ");
    sql.push_str(&format!(" AND ({placeholders})"));
    for key in keys {
        if let Some((device_id, signal_name)) = key.split() {
            params.push(duckdb::types::Value::Text(device_id.to_string()));
            params.push(duckdb::types::Value::Text(signal_name.to_string()));
        }
    }
}

fn row_to_entry(row: &Row<'_>) -> duckdb::Result<LogEntry> {
    let signal_type_label: String = row.get(5)?;
    let value_text: String = row.get(4)?;
    let signal_type = label_to_signal_type(&signal_type_label);
    let source_id: Option<String> = row.get(9)?;

    Ok(LogEntry {
        timestamp_millis: row.get(1)?,
        device_id: row.get(2)?,
        signal_name: row.get(3)?,
        value: SignalValue::from_storage_string(&value_text, signal_type),
        category: row.get(6)?,
        line_number: row.get(7)?,
        raw_line: row.get(8)?,
        source_id: source_id.and_then(|s| s.parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: i64, device: &str, signal: &str, value: SignalValue) -> LogEntry {
        LogEntry {
            timestamp_millis: ts,
            device_id: device.to_string(),
            signal_name: signal.to_string(),
            value,
            category: Some("status".to_string()),
            line_number: 1,
            raw_line: Some("raw".to_string()),
            source_id: None,
        }
    }

    #[test]
    fn append_then_len_reflects_flushed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColumnarStore::create(dir.path().join("file_test.db")).unwrap();
        store
            .append(&[
                entry(100, "DEV-1", "Running", SignalValue::Boolean(true)),
                entry(200, "DEV-1", "Count", SignalValue::Integer(7)),
            ])
            .unwrap();
        store.flush().unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn query_entries_filters_by_category_and_reports_total() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColumnarStore::create(dir.path().join("file_test.db")).unwrap();
        store
            .append(&[
                entry(100, "DEV-1", "Running", SignalValue::Boolean(true)),
                entry(200, "DEV-2", "Running", SignalValue::Boolean(false)),
            ])
            .unwrap();
        store.flush().unwrap();

        let filters = QueryFilters {
            category: Some("status".to_string()),
            ..Default::default()
        };
        let (entries, total) = store.query_entries(&filters, 0, 10).unwrap();
        assert_eq!(total, 2);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].device_id, "DEV-1");
    }

    #[test]
    fn get_time_range_is_none_for_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColumnarStore::create(dir.path().join("file_test.db")).unwrap();
        assert_eq!(store.get_time_range().unwrap(), None);
    }

    #[test]
    fn get_values_at_time_returns_latest_entry_per_signal_at_or_before_ts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColumnarStore::create(dir.path().join("file_test.db")).unwrap();
        store
            .append(&[
                entry(100, "DEV-1", "Count", SignalValue::Integer(1)),
                entry(200, "DEV-1", "Count", SignalValue::Integer(2)),
                entry(300, "DEV-1", "Count", SignalValue::Integer(3)),
            ])
            .unwrap();
        store.flush().unwrap();

        let values = store.get_values_at_time(250, None).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, SignalValue::Integer(2));
    }

    #[test]
    fn changed_only_is_consistent_across_query_entries_index_and_time_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColumnarStore::create(dir.path().join("file_test.db")).unwrap();
        store
            .append(&[
                entry(100, "DEV-1", "Count", SignalValue::Integer(1)),
                entry(200, "DEV-1", "Count", SignalValue::Integer(1)),
                entry(300, "DEV-1", "Count", SignalValue::Integer(2)),
                entry(400, "DEV-1", "Count", SignalValue::Integer(2)),
            ])
            .unwrap();
        store.flush().unwrap();

        let filters = QueryFilters { changed_only: true, ..Default::default() };

        let (entries, total) = store.query_entries(&filters, 0, 10).unwrap();
        assert_eq!(total, 2, "only the first occurrence of each distinct value should survive");
        assert_eq!(entries.iter().map(|e| e.timestamp_millis).collect::<Vec<_>>(), vec![100, 300]);

        // The rank of the row at ts=300 among the changed-only set is 1, not 2 as it would be
        // against the unfiltered table.
        assert_eq!(store.get_index_by_time(&filters, 300).unwrap(), 1);

        let tree = store.get_time_tree(&filters).unwrap();
        assert_eq!(tree.iter().map(|n| n.first_ts).collect::<Vec<_>>(), vec![100, 300]);
    }
}
