//! Translates a [`QueryFilters`] into a SQL predicate plus bound parameters, shared by every
//! read path in [`super::store::ColumnarStore`] (spec.md §4.4, §4.7).

use duckdb::types::Value;
use regex::Regex;
use tv_model::{QueryFilters, SearchMode, SortBy, SortOrder};

/// A `WHERE` predicate (without the `WHERE` keyword) and its positional `?` parameters.
#[derive(Debug, Clone, Default)]
pub struct FilterClause {
    pub predicate: String,
    pub params: Vec<Value>,
}

impl FilterClause {
    fn and(&mut self, fragment: impl Into<String>) {
        if !self.predicate.is_empty() {
            self.predicate.push_str(" AND ");
        }
        self.predicate.push_str(&fragment.into());
    }
}

/// Builds the predicate for everything in `filters` except `changed_only`, which is evaluated
/// as a window function one layer up (see [`super::store::ColumnarStore::query_entries`]).
pub fn build_where(filters: &QueryFilters) -> FilterClause {
    let mut clause = FilterClause::default();

    if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        match filters.search_mode {
            SearchMode::Substring => {
                clause.and(
                    "(device_id ILIKE ? OR signal_name ILIKE ? OR value ILIKE ? OR category ILIKE ?)",
                );
                let pattern = Value::Text(format!("%{search}%"));
                for _ in 0..4 {
                    clause.params.push(pattern.clone());
                }
            }
            SearchMode::CaseSensitive => {
                clause.and(
                    "(device_id LIKE ? OR signal_name LIKE ? OR value LIKE ? OR category LIKE ?)",
                );
                let pattern = Value::Text(format!("%{search}%"));
                for _ in 0..4 {
                    clause.params.push(pattern.clone());
                }
            }
            SearchMode::Regex => {
                // Regex failures degrade to a plain substring match (spec.md §4.7 "Search").
                if Regex::new(search).is_ok() {
                    clause.and(
                        "(regexp_matches(device_id, ?) OR regexp_matches(signal_name, ?) OR regexp_matches(value, ?) OR regexp_matches(category, ?))",
                    );
                    let pattern = Value::Text(search.to_string());
                    for _ in 0..4 {
                        clause.params.push(pattern.clone());
                    }
                } else {
                    clause.and(
                        "(device_id ILIKE ? OR signal_name ILIKE ? OR value ILIKE ? OR category ILIKE ?)",
                    );
                    let pattern = Value::Text(format!("%{search}%"));
                    for _ in 0..4 {
                        clause.params.push(pattern.clone());
                    }
                }
            }
        }
    }

    if let Some(category) = &filters.category {
        clause.and("category = ?");
        clause.params.push(Value::Text(category.clone()));
    }

    if let Some(signal_type) = filters.signal_type {
        clause.and("signal_type = ?");
        clause.params.push(Value::Text(signal_type.label().to_string()));
    }

    if let Some(keys) = &filters.signal_keys {
        if keys.is_empty() {
            // An explicit empty key list matches nothing.
            clause.and("FALSE");
        } else {
            let placeholders = vec!["(device_id = ? AND signal_name = ?)"; keys.len()].join(" OR ");
            clause.and(format!("({placeholders})"));
            for key in keys {
                let Some((device_id, signal_name)) = key.split() else { continue };
                clause.params.push(Value::Text(device_id.to_string()));
                clause.params.push(Value::Text(signal_name.to_string()));
            }
        }
    }

    clause
}

/// The `ORDER BY` clause matching `filters.sort_by`/`filters.order`. `seq` is always the final
/// tiebreaker so that pagination is stable across identical timestamps or signal names.
pub fn build_order_by(filters: &QueryFilters) -> String {
    let direction = match filters.order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    };
    match filters.sort_by {
        SortBy::Timestamp => format!("ORDER BY ts {direction}, seq {direction}"),
        SortBy::Signal => format!("ORDER BY device_id {direction}, signal_name {direction}, seq {direction}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tv_contracts::SignalKey;

    #[test]
    fn empty_filters_produce_an_empty_predicate() {
        let clause = build_where(&QueryFilters::default());
        assert!(clause.predicate.is_empty());
        assert!(clause.params.is_empty());
    }

    #[test]
    fn signal_keys_filter_expands_to_one_pair_per_key() {
        let filters = QueryFilters {
            signal_keys: Some(vec![SignalKey::new("DEV-1", "Running")]),
            ..Default::default()
        };
        let clause = build_where(&filters);
        assert!(clause.predicate.contains("device_id = ?"));
        assert_eq!(clause.params.len(), 2);
    }

    #[test]
    fn invalid_regex_falls_back_to_substring_predicate() {
        let filters = QueryFilters {
            search: Some("(unterminated".to_string()),
            search_mode: SearchMode::Regex,
            ..Default::default()
        };
        let clause = build_where(&filters);
        assert!(clause.predicate.contains("ILIKE"));
    }
}
