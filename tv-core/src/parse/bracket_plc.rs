//! Bracket-PLC dialect: `<timestamp> [Level] [path] [key:name] (Type) : value` (spec.md §4.3).
//!
//! This is the dominant format and the one responsible for the largest files, so it is the only
//! dialect that implements [`StreamingLogParser`]; the others fall back to in-memory
//! accumulation.

use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use tv_model::{LogEntry, ParseError, SignalType, SignalValue};

use crate::error::Result;

use super::{EntrySink, LogParser, ParseProgress, ParseSummary, StreamingLogParser};

const FLUSH_BATCH_SIZE: usize = 50_000;

static LINE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<ts>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3}) \[(?P<level>[^\]]*)\] \[(?P<path>[^\]]*)\] \[key:(?P<signal>[^\]]*)\] \((?P<type>[^)]*)\)\s*:\s*(?P<value>.*)$",
    )
    .expect("static bracket-plc pattern is valid")
});

#[derive(Debug, Default)]
pub struct BracketPlcParser;

impl BracketPlcParser {
    fn parse_line(line: &str, line_number: u64) -> std::result::Result<LogEntry, ParseError> {
        let caps = LINE_PATTERN.captures(line).ok_or_else(|| ParseError {
            line_number,
            raw_line: line.to_string(),
            reason: "line does not match bracket-plc grammar".to_string(),
        })?;

        let ts_str = &caps["ts"];
        let timestamp_millis = NaiveDateTime::parse_from_str(ts_str, "%Y-%m-%d %H:%M:%S%.3f")
            .map(|dt| dt.and_utc().timestamp_millis())
            .map_err(|err| ParseError {
                line_number,
                raw_line: line.to_string(),
                reason: format!("invalid timestamp {ts_str:?}: {err}"),
            })?;

        let device_id = caps["path"]
            .split('/')
            .next_back()
            .unwrap_or(&caps["path"])
            .to_string();
        let signal_name = caps["signal"].to_string();
        let signal_type = match &caps["type"] {
            "Boolean" | "Bool" => SignalType::Boolean,
            "Int" | "Integer" => SignalType::Integer,
            _ => SignalType::String,
        };
        let value_text = caps["value"].trim();
        let value = match signal_type {
            SignalType::Boolean => {
                let parsed = match value_text.to_ascii_lowercase().as_str() {
                    "true" | "1" | "on" => true,
                    "false" | "0" | "off" => false,
                    other => {
                        return Err(ParseError {
                            line_number,
                            raw_line: line.to_string(),
                            reason: format!("invalid boolean value {other:?}"),
                        })
                    }
                };
                SignalValue::Boolean(parsed)
            }
            SignalType::Integer => value_text.parse::<i64>().map(SignalValue::Integer).map_err(
                |err| ParseError {
                    line_number,
                    raw_line: line.to_string(),
                    reason: format!("invalid integer value {value_text:?}: {err}"),
                },
            )?,
            SignalType::String => SignalValue::String(value_text.to_string()),
        };

        Ok(LogEntry {
            timestamp_millis,
            device_id,
            signal_name,
            value,
            category: None,
            line_number,
            raw_line: Some(line.to_string()),
            source_id: None,
        })
    }
}

impl LogParser for BracketPlcParser {
    fn name(&self) -> &'static str {
        "bracket-plc"
    }

    fn can_parse(&self, head: &str) -> bool {
        head.lines().any(|line| LINE_PATTERN.is_match(line))
    }

    fn parse_with_progress(
        &self,
        path: &Path,
        on_progress: &mut dyn FnMut(ParseProgress),
    ) -> Result<(Vec<LogEntry>, Vec<ParseError>, ParseSummary)> {
        let mut entries = Vec::new();
        let mut sink = VecSink(&mut entries);
        let (errors, summary) = self.parse_to_sink(path, &mut sink, on_progress)?;
        Ok((entries, errors, summary))
    }
}

struct VecSink<'a>(&'a mut Vec<LogEntry>);

impl EntrySink for VecSink<'_> {
    fn append(&mut self, entries: &[LogEntry]) -> Result<()> {
        self.0.extend_from_slice(entries);
        Ok(())
    }
}

impl StreamingLogParser for BracketPlcParser {
    fn parse_to_sink(
        &self,
        path: &Path,
        sink: &mut dyn EntrySink,
        on_progress: &mut dyn FnMut(ParseProgress),
    ) -> Result<(Vec<ParseError>, ParseSummary)> {
        let total_bytes = std::fs::metadata(path)?.len();
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);

        let mut batch = Vec::with_capacity(FLUSH_BATCH_SIZE);
        let mut errors = Vec::new();
        let mut signals = HashSet::new();
        let mut entry_count: u64 = 0;
        let mut bytes_read: u64 = 0;
        let mut line_number: u64 = 0;

        for line in reader.lines() {
            line_number += 1;
            let line = line?;
            bytes_read += line.len() as u64 + 1;
            if line.trim().is_empty() {
                continue;
            }

            match Self::parse_line(&line, line_number) {
                Ok(entry) => {
                    signals.insert(entry.signal_key());
                    entry_count += 1;
                    batch.push(entry);
                    if batch.len() >= FLUSH_BATCH_SIZE {
                        sink.append(&batch)?;
                        batch.clear();
                    }
                }
                Err(err) => errors.push(err),
            }

            on_progress(ParseProgress {
                lines_processed: line_number,
                bytes_read,
                total_bytes,
            });
        }
        if !batch.is_empty() {
            sink.append(&batch)?;
        }

        Ok((
            errors,
            ParseSummary {
                entry_count,
                signal_count: signals.len() as u64,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        [
            "2024-01-01 00:00:00.000 [INFO] [SYS/DEV-1] [key:Running] (Boolean) : true",
            "2024-01-01 00:00:00.500 [INFO] [SYS/DEV-1] [key:Count] (Int) : 42",
            "this line is garbage and should be skipped",
            "2024-01-01 00:00:01.000 [INFO] [SYS/DEV-2] [key:State] (String) : IDLE",
        ]
        .join("\n")
    }

    #[test]
    fn can_parse_recognizes_the_bracket_grammar() {
        let parser = BracketPlcParser;
        assert!(parser.can_parse(&sample()));
        assert!(!parser.can_parse("device,signal,value\n1,2,3"));
    }

    #[test]
    fn streams_valid_lines_and_accumulates_errors_for_malformed_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.log");
        std::fs::write(&path, sample()).unwrap();

        let parser = BracketPlcParser;
        let mut sink: Vec<LogEntry> = Vec::new();
        let (errors, summary) = parser.parse_to_sink(&path, &mut sink, &mut |_| {}).unwrap();

        assert_eq!(sink.len(), 3);
        assert_eq!(errors.len(), 1);
        assert_eq!(summary.entry_count, 3);
        assert_eq!(summary.signal_count, 3);
        assert_eq!(sink[1].value, SignalValue::Integer(42));
    }
}
