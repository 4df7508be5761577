//! Generic CSV dialect: a comma-separated header maps column names onto the entry schema
//! (spec.md §4.3). The catch-all parser, tried last by the registry.

use std::io::BufRead;
use std::path::Path;

use chrono::NaiveDateTime;
use tv_model::{LogEntry, ParseError, SignalValue};

use crate::error::Result;

use super::{LogParser, ParseProgress, ParseSummary};

const TIMESTAMP_HEADERS: &[&str] = &["timestamp", "time", "ts"];
const DEVICE_HEADERS: &[&str] = &["device", "deviceid", "device_id"];
const SIGNAL_HEADERS: &[&str] = &["signal", "signalname", "signal_name", "tag"];
const VALUE_HEADERS: &[&str] = &["value", "val"];
const CATEGORY_HEADERS: &[&str] = &["category", "group"];

pub(super) fn infer_value(raw: &str) -> SignalValue {
    if let Ok(i) = raw.parse::<i64>() {
        return SignalValue::Integer(i);
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" | "on" => return SignalValue::Boolean(true),
        "false" | "off" => return SignalValue::Boolean(false),
        _ => {}
    }
    SignalValue::String(raw.to_string())
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.3f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
        .or_else(|| raw.parse::<i64>().ok())
}

struct Columns {
    timestamp: usize,
    device: usize,
    signal: usize,
    value: usize,
    category: Option<usize>,
}

fn split_csv_line(line: &str) -> Vec<String> {
    line.split(',').map(|f| f.trim().to_string()).collect()
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.contains(&h.to_ascii_lowercase().as_str()))
}

fn resolve_columns(header_line: &str) -> Option<Columns> {
    let headers = split_csv_line(header_line);
    Some(Columns {
        timestamp: find_column(&headers, TIMESTAMP_HEADERS)?,
        device: find_column(&headers, DEVICE_HEADERS)?,
        signal: find_column(&headers, SIGNAL_HEADERS)?,
        value: find_column(&headers, VALUE_HEADERS)?,
        category: find_column(&headers, CATEGORY_HEADERS),
    })
}

#[derive(Debug, Default)]
pub struct CsvParser;

impl LogParser for CsvParser {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn can_parse(&self, head: &str) -> bool {
        head.lines()
            .find(|line| !line.trim().is_empty())
            .and_then(resolve_columns)
            .is_some()
    }

    fn parse_with_progress(
        &self,
        path: &Path,
        on_progress: &mut dyn FnMut(ParseProgress),
    ) -> Result<(Vec<LogEntry>, Vec<ParseError>, ParseSummary)> {
        let total_bytes = std::fs::metadata(path)?.len();
        let reader = std::io::BufReader::new(std::fs::File::open(path)?);

        let mut entries = Vec::new();
        let mut errors = Vec::new();
        let mut signals = std::collections::HashSet::new();
        let mut columns: Option<Columns> = None;
        let mut bytes_read: u64 = 0;
        let mut line_number: u64 = 0;

        for line in reader.lines() {
            line_number += 1;
            let line = line?;
            bytes_read += line.len() as u64 + 1;

            if line.trim().is_empty() {
                continue;
            }
            if columns.is_none() {
                columns = resolve_columns(&line);
                continue;
            }
            let cols = columns.as_ref().expect("header resolved before first data row");
            let fields = split_csv_line(&line);
            let needed = [cols.timestamp, cols.device, cols.signal, cols.value];
            if needed.iter().any(|&i| i >= fields.len()) {
                errors.push(ParseError {
                    line_number,
                    raw_line: line.clone(),
                    reason: "row has fewer columns than the header declared".to_string(),
                });
                continue;
            }

            match parse_timestamp(&fields[cols.timestamp]) {
                Some(timestamp_millis) => {
                    let entry = LogEntry {
                        timestamp_millis,
                        device_id: fields[cols.device].clone(),
                        signal_name: fields[cols.signal].clone(),
                        value: infer_value(&fields[cols.value]),
                        category: cols.category.and_then(|i| fields.get(i)).cloned(),
                        line_number,
                        raw_line: Some(line.clone()),
                        source_id: None,
                    };
                    signals.insert(entry.signal_key());
                    entries.push(entry);
                }
                None => errors.push(ParseError {
                    line_number,
                    raw_line: line.clone(),
                    reason: format!("invalid timestamp {:?}", fields[cols.timestamp]),
                }),
            }

            on_progress(ParseProgress {
                lines_processed: line_number,
                bytes_read,
                total_bytes,
            });
        }

        let summary = ParseSummary {
            entry_count: entries.len() as u64,
            signal_count: signals.len() as u64,
        };
        Ok((entries, errors, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        [
            "timestamp,device,signal,value,category",
            "2024-01-01 00:00:00.000,SYS/DEV-1,Running,true,status",
            "2024-01-01 00:00:00.500,SYS/DEV-1,Count,42,metric",
        ]
        .join("\n")
    }

    #[test]
    fn recognizes_a_csv_header() {
        assert!(CsvParser.can_parse(&sample()));
    }

    #[test]
    fn maps_columns_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        std::fs::write(&path, sample()).unwrap();

        let (entries, errors, summary) = CsvParser.parse(&path).unwrap();
        assert!(errors.is_empty());
        assert_eq!(entries.len(), 2);
        assert_eq!(summary.signal_count, 2);
        assert_eq!(entries[0].category.as_deref(), Some("status"));
    }
}
