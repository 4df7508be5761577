use serde::{Deserialize, Serialize};
use tv_contracts::SignalKey;

use crate::entry::{LogEntry, SignalType};

/// Sort order for [`QueryFilters`]-driven reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Ascending
    }
}

/// Which indexed column a query is sorted on; determines which keyset cursor
/// `queryEntries` resolves deep pages against (spec.md §4.4, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Timestamp,
    Signal,
}

impl Default for SortBy {
    fn default() -> Self {
        SortBy::Timestamp
    }
}

/// Search-mode for the substring/regex filter (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Substring,
    CaseSensitive,
    Regex,
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::Substring
    }
}

/// The combined filter + sort expression applied across the query surface. Two queries with an
/// identical `QueryFilters` form the cache key for the row-count cache (spec.md §4.7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilters {
    pub search: Option<String>,
    pub search_mode: SearchMode,
    pub category: Option<String>,
    pub signal_type: Option<SignalType>,
    pub signal_keys: Option<Vec<SignalKey>>,
    pub changed_only: bool,
    pub sort_by: SortBy,
    pub order: SortOrder,
}

impl QueryFilters {
    /// A stable cache key for the row-count cache; two filter sets that would select the same
    /// rows in the same order produce the same key.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One page of a filtered, paginated read, plus the total matching row count
/// (spec.md §4.4 `queryEntries`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPage {
    pub entries: Vec<LogEntry>,
    pub total_matching: u64,
    pub page: u64,
    pub page_size: u64,
}

/// The result of `getBoundaryValues`: the last entry strictly before `start_ts` and the first
/// entry strictly after `end_ts`, per signal (spec.md §4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundaryValues {
    pub before: std::collections::HashMap<String, LogEntry>,
    pub after: std::collections::HashMap<String, LogEntry>,
}

/// One leaf of the hierarchical jump-to-time tree (spec.md §4.4 `getTimeTree`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeTreeNode {
    pub date: String,
    pub hour: u8,
    pub minute: u8,
    pub first_ts: i64,
}

/// The inclusive `[min, max]` timestamp range of a store, or `None` for an empty store.
pub type TimeRange = Option<(i64, i64)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_filters_produce_identical_cache_keys() {
        let a = QueryFilters {
            search: Some("ON".to_string()),
            ..Default::default()
        };
        let b = QueryFilters {
            search: Some("ON".to_string()),
            ..Default::default()
        };
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn different_filters_produce_different_cache_keys() {
        let a = QueryFilters::default();
        let b = QueryFilters {
            changed_only: true,
            ..Default::default()
        };
        assert_ne!(a.cache_key(), b.cache_key());
    }
}
