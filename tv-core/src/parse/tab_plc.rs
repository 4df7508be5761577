//! Tab-delimited PLC dialect: a header row declares column semantics, data rows are
//! tab-separated (spec.md §4.3).

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

#[derive(Debug, Default)]
pub struct TabPlcParser;

struct Columns {
    timestamp: usize,
    device: usize,
    signal: usize,
    value: usize,
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.contains(&h.trim().to_ascii_lowercase().as_str()))
}

fn resolve_columns(header_line: &str) -> Option<Columns> {
    let headers: Vec<String> = header_line.split('\t').map(|h| h.to_string()).collect();
    Some(Columns {
        timestamp: find_column(&headers, TIMESTAMP_HEADERS)?,
        device: find_column(&headers, DEVICE_HEADERS)?,
        signal: find_column(&headers, SIGNAL_HEADERS)?,
        value: find_column(&headers, VALUE_HEADERS)?,
    })
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.3f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok()
}

fn infer_value(raw: &str) -> SignalValue {
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

impl LogParser for TabPlcParser {
    fn name(&self) -> &'static str {
        "tab-plc"
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
                on_progress(ParseProgress {
                    lines_processed: line_number,
                    bytes_read,
                    total_bytes,
                });
                continue;
            }
            let cols = columns.as_ref().expect("header resolved before first data row");
            let fields: Vec<&str> = line.split('\t').collect();
            let needed = [cols.timestamp, cols.device, cols.signal, cols.value];
            if needed.iter().any(|&i| i >= fields.len()) {
                errors.push(ParseError {
                    line_number,
                    raw_line: line.clone(),
                    reason: "row has fewer columns than the header declared".to_string(),
                });
                continue;
            }

            match parse_timestamp(fields[cols.timestamp].trim()) {
                Some(timestamp_millis) => {
                    let entry = LogEntry {
                        timestamp_millis,
                        device_id: fields[cols.device].trim().to_string(),
                        signal_name: fields[cols.signal].trim().to_string(),
                        value: infer_value(fields[cols.value].trim()),
                        category: None,
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
            "timestamp\tdevice\tsignal\tvalue",
            "2024-01-01 00:00:00.000\tSYS/DEV-1\tRunning\ttrue",
            "2024-01-01 00:00:00.500\tSYS/DEV-1\tCount\t42",
            "garbage row with only one column",
        ]
        .join("\n")
    }

    #[test]
    fn recognizes_a_tab_delimited_header() {
        let parser = TabPlcParser;
        assert!(parser.can_parse(&sample()));
    }

    #[test]
    fn parses_rows_after_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.tsv");
        std::fs::write(&path, sample()).unwrap();

        let parser = TabPlcParser;
        let (entries, errors, summary) = parser.parse(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(summary.signal_count, 2);
        assert_eq!(entries[1].value, SignalValue::Integer(42));
    }
}
