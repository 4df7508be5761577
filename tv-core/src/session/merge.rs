//! Multi-file merge: combine each file's in-memory entries, sort by time, and drop
//! cross-file duplicates (spec.md §4.6 "Merge path").

use std::collections::HashMap;

use tv_contracts::SignalKey;
use tv_model::LogEntry;

/// Entries sharing `(deviceId, signalName, value)` within this many milliseconds of each other
/// are treated as the same event logged by more than one source file.
const FUZZY_WINDOW_MILLIS: i64 = 1_000;

/// Sorts `entries` by timestamp and removes duplicates per spec.md's fuzzy-window rule. Each
/// surviving entry keeps the `source_id` it arrived with.
pub fn merge(mut entries: Vec<LogEntry>) -> Vec<LogEntry> {
    entries.sort_by_key(|e| e.timestamp_millis);

    let mut last_retained: HashMap<SignalKey, (i64, tv_model::SignalValue)> = HashMap::new();
    let mut merged = Vec::with_capacity(entries.len());

    for entry in entries {
        let key = entry.signal_key();
        let is_duplicate = match last_retained.get(&key) {
            Some((last_ts, last_value)) => {
                *last_value == entry.value && (entry.timestamp_millis - last_ts).abs() <= FUZZY_WINDOW_MILLIS
            }
            None => false,
        };
        if is_duplicate {
            continue;
        }
        last_retained.insert(key, (entry.timestamp_millis, entry.value.clone()));
        merged.push(entry);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use tv_contracts::FileId;
    use tv_model::SignalValue;

    fn entry(ts: i64, source: FileId) -> LogEntry {
        LogEntry {
            timestamp_millis: ts,
            device_id: "DEV-1".to_string(),
            signal_name: "Running".to_string(),
            value: SignalValue::Boolean(true),
            category: None,
            line_number: 1,
            raw_line: None,
            source_id: Some(source),
        }
    }

    #[test]
    fn drops_the_same_value_logged_twice_within_the_fuzzy_window() {
        let a = FileId::new();
        let b = FileId::new();
        let merged = merge(vec![entry(1_000, a), entry(1_400, b)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source_id, Some(a));
    }

    #[test]
    fn keeps_repeats_outside_the_fuzzy_window() {
        let a = FileId::new();
        let merged = merge(vec![entry(1_000, a), entry(5_000, a)]);
        assert_eq!(merged.len(), 2);
    }
}
