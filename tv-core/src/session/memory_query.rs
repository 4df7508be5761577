//! The same read surface as [`crate::columnar::ColumnarStore`], evaluated directly over an
//! in-memory `Vec<LogEntry>`. Used for merged multi-file sessions, which never get a persisted
//! store (spec.md §4.6 "Merge path").

use std::collections::{HashMap, HashSet};

use regex::Regex;
use tv_contracts::SignalKey;
use tv_model::{BoundaryValues, LogEntry, QueryFilters, SearchMode, SignalType, SortBy, SortOrder, TimeTreeNode};

fn matches_search(entry: &LogEntry, search: &str, mode: SearchMode) -> bool {
    let value_text = entry.value.to_storage_string();
    let haystacks = [
        entry.device_id.as_str(),
        entry.signal_name.as_str(),
        value_text.as_str(),
        entry.category.as_deref().unwrap_or(""),
    ];
    match mode {
        SearchMode::Substring => {
            let needle = search.to_ascii_lowercase();
            haystacks.iter().any(|h| h.to_ascii_lowercase().contains(&needle))
        }
        SearchMode::CaseSensitive => haystacks.iter().any(|h| h.contains(search)),
        SearchMode::Regex => match Regex::new(search) {
            Ok(re) => haystacks.iter().any(|h| re.is_match(h)),
            Err(_) => matches_search(entry, search, SearchMode::Substring),
        },
    }
}

fn matches_filters(entry: &LogEntry, filters: &QueryFilters) -> bool {
    if let Some(search) = filters.search.as_deref().filter(|s| !s.trim().is_empty()) {
        if !matches_search(entry, search, filters.search_mode) {
            return false;
        }
    }
    if let Some(category) = &filters.category {
        if entry.category.as_deref() != Some(category.as_str()) {
            return false;
        }
    }
    if let Some(signal_type) = filters.signal_type {
        if entry.signal_type() != signal_type {
            return false;
        }
    }
    if let Some(keys) = &filters.signal_keys {
        if !keys.iter().any(|k| k.as_str() == entry.signal_key().as_str()) {
            return false;
        }
    }
    true
}

fn sort_key(entry: &LogEntry) -> (i64, String, String, u64) {
    (entry.timestamp_millis, entry.device_id.clone(), entry.signal_name.clone(), entry.line_number)
}

/// Applies every filter in `filters` except `changed_only`, then sorts by `sort_by`/`order`.
pub fn filtered_sorted<'a>(entries: &'a [LogEntry], filters: &QueryFilters) -> Vec<&'a LogEntry> {
    let mut matched: Vec<&LogEntry> = entries.iter().filter(|e| matches_filters(e, filters)).collect();

    match filters.sort_by {
        SortBy::Timestamp => matched.sort_by_key(|e| (e.timestamp_millis, e.line_number)),
        SortBy::Signal => matched.sort_by(|a, b| {
            (a.device_id.as_str(), a.signal_name.as_str(), a.line_number)
                .cmp(&(b.device_id.as_str(), b.signal_name.as_str(), b.line_number))
        }),
    }
    if filters.order == SortOrder::Descending {
        matched.reverse();
    }

    if filters.changed_only {
        let mut last: HashMap<SignalKey, &tv_model::SignalValue> = HashMap::new();
        matched = matched
            .into_iter()
            .filter(|e| {
                let key = e.signal_key();
                let changed = last.get(&key).map(|v| **v != e.value).unwrap_or(true);
                last.insert(key, &e.value);
                changed
            })
            .collect();
    }

    matched
}

pub fn query_entries(entries: &[LogEntry], filters: &QueryFilters, page: u64, page_size: u64) -> (Vec<LogEntry>, u64) {
    let matched = filtered_sorted(entries, filters);
    let total = matched.len() as u64;
    let start = (page.saturating_mul(page_size)) as usize;
    let page_entries = matched
        .into_iter()
        .skip(start)
        .take(page_size as usize)
        .cloned()
        .collect();
    (page_entries, total)
}

pub fn get_entries(entries: &[LogEntry], offset_start: u64, offset_end_exclusive: u64) -> Vec<LogEntry> {
    let mut sorted: Vec<&LogEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| sort_key(e));
    sorted
        .into_iter()
        .skip(offset_start as usize)
        .take(offset_end_exclusive.saturating_sub(offset_start) as usize)
        .cloned()
        .collect()
}

pub fn get_chunk(entries: &[LogEntry], start_ts: i64, end_ts: i64, signal_keys: Option<&[SignalKey]>) -> Vec<LogEntry> {
    let mut matched: Vec<&LogEntry> = entries
        .iter()
        .filter(|e| e.timestamp_millis >= start_ts && e.timestamp_millis <= end_ts)
        .filter(|e| signal_keys.map_or(true, |keys| keys.iter().any(|k| k.as_str() == e.signal_key().as_str())))
        .collect();
    matched.sort_by_key(|e| sort_key(e));
    matched.into_iter().cloned().collect()
}

pub fn get_values_at_time(entries: &[LogEntry], ts: i64, signal_keys: Option<&[SignalKey]>) -> Vec<LogEntry> {
    let mut latest: HashMap<SignalKey, &LogEntry> = HashMap::new();
    for entry in entries {
        if entry.timestamp_millis > ts {
            continue;
        }
        if let Some(keys) = signal_keys {
            if !keys.iter().any(|k| k.as_str() == entry.signal_key().as_str()) {
                continue;
            }
        }
        let key = entry.signal_key();
        let is_newer = latest
            .get(&key)
            .map(|current| entry.timestamp_millis > current.timestamp_millis)
            .unwrap_or(true);
        if is_newer {
            latest.insert(key, entry);
        }
    }
    latest.into_values().cloned().collect()
}

pub fn get_boundary_values(entries: &[LogEntry], start_ts: i64, end_ts: i64, signal_keys: &[SignalKey]) -> BoundaryValues {
    let mut before: HashMap<String, LogEntry> = HashMap::new();
    let mut after: HashMap<String, LogEntry> = HashMap::new();

    for entry in entries {
        let key = entry.signal_key();
        if !signal_keys.is_empty() && !signal_keys.iter().any(|k| k.as_str() == key.as_str()) {
            continue;
        }
        if entry.timestamp_millis < start_ts {
            let better = before.get(key.as_str()).map(|b| entry.timestamp_millis > b.timestamp_millis).unwrap_or(true);
            if better {
                before.insert(key.to_string(), entry.clone());
            }
        }
        if entry.timestamp_millis > end_ts {
            let better = after.get(key.as_str()).map(|a| entry.timestamp_millis < a.timestamp_millis).unwrap_or(true);
            if better {
                after.insert(key.to_string(), entry.clone());
            }
        }
    }
    BoundaryValues { before, after }
}

pub fn get_index_by_time(entries: &[LogEntry], filters: &QueryFilters, ts: i64) -> i64 {
    let matched = filtered_sorted(entries, filters);
    matched
        .iter()
        .position(|e| e.timestamp_millis >= ts)
        .map(|pos| pos as i64)
        .unwrap_or(-1)
}

pub fn get_time_tree(entries: &[LogEntry], filters: &QueryFilters) -> Vec<TimeTreeNode> {
    use chrono::{DateTime, Timelike, Utc};

    let matched = filtered_sorted(entries, filters);
    let mut buckets: HashMap<(String, u8, u8), i64> = HashMap::new();
    for entry in matched {
        let dt: DateTime<Utc> = DateTime::from_timestamp_millis(entry.timestamp_millis).unwrap_or_default();
        let date = dt.format("%Y-%m-%d").to_string();
        let key = (date, dt.hour() as u8, dt.minute() as u8);
        let slot = buckets.entry(key).or_insert(entry.timestamp_millis);
        if entry.timestamp_millis < *slot {
            *slot = entry.timestamp_millis;
        }
    }
    let mut nodes: Vec<TimeTreeNode> = buckets
        .into_iter()
        .map(|((date, hour, minute), first_ts)| TimeTreeNode { date, hour, minute, first_ts })
        .collect();
    nodes.sort_by_key(|n| n.first_ts);
    nodes
}

pub fn get_signals(entries: &[LogEntry]) -> Vec<SignalKey> {
    let mut keys: Vec<SignalKey> = entries.iter().map(|e| e.signal_key()).collect::<HashSet<_>>().into_iter().collect();
    keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    keys
}

pub fn get_signal_types(entries: &[LogEntry]) -> HashMap<String, SignalType> {
    entries.iter().map(|e| (e.signal_key().to_string(), e.signal_type())).collect()
}

pub fn get_categories(entries: &[LogEntry]) -> Vec<String> {
    let mut categories: Vec<String> = entries
        .iter()
        .filter_map(|e| e.category.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    categories.sort();
    categories
}

pub fn get_time_range(entries: &[LogEntry]) -> Option<(i64, i64)> {
    let min = entries.iter().map(|e| e.timestamp_millis).min();
    let max = entries.iter().map(|e| e.timestamp_millis).max();
    min.zip(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tv_model::SignalValue;

    fn entry(ts: i64, device: &str, signal: &str, value: SignalValue) -> LogEntry {
        LogEntry {
            timestamp_millis: ts,
            device_id: device.to_string(),
            signal_name: signal.to_string(),
            value,
            category: None,
            line_number: 1,
            raw_line: None,
            source_id: None,
        }
    }

    #[test]
    fn query_entries_paginates_and_reports_total() {
        let entries = vec![
            entry(100, "DEV-1", "Running", SignalValue::Boolean(true)),
            entry(200, "DEV-1", "Running", SignalValue::Boolean(false)),
            entry(300, "DEV-1", "Running", SignalValue::Boolean(true)),
        ];
        let (page, total) = query_entries(&entries, &QueryFilters::default(), 1, 2);
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].timestamp_millis, 300);
    }

    #[test]
    fn changed_only_drops_repeated_values() {
        let entries = vec![
            entry(100, "DEV-1", "Running", SignalValue::Boolean(true)),
            entry(200, "DEV-1", "Running", SignalValue::Boolean(true)),
            entry(300, "DEV-1", "Running", SignalValue::Boolean(false)),
        ];
        let filters = QueryFilters { changed_only: true, ..Default::default() };
        let filtered = filtered_sorted(&entries, &filters);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn get_values_at_time_picks_latest_entry_at_or_before_ts() {
        let entries = vec![
            entry(100, "DEV-1", "Count", SignalValue::Integer(1)),
            entry(200, "DEV-1", "Count", SignalValue::Integer(2)),
        ];
        let values = get_values_at_time(&entries, 150, None);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, SignalValue::Integer(1));
    }
}
