//! MCS/AMHS dialect: a tab-separated header carrying `CarrierID` or `CurrentLocation` columns.
//! Each data row is a single timestamped event that fans out into one [`LogEntry`] per populated
//! `key=value` column (spec.md §4.3).

use std::io::BufRead;
use std::path::Path;

use chrono::NaiveDateTime;
use tv_model::{LogEntry, ParseError};

use crate::error::Result;

use super::{LogParser, ParseProgress, ParseSummary};

const SNIFF_TOKENS: &[&str] = &["carrierid", "currentlocation"];
const TIMESTAMP_HEADERS: &[&str] = &["timestamp", "time", "ts"];
const DEVICE_HEADERS: &[&str] = &["equipmentid", "device", "deviceid", "device_id"];

struct Schema {
    timestamp_col: usize,
    device_col: Option<usize>,
    field_cols: Vec<(usize, String)>,
}

fn resolve_schema(header_line: &str) -> Option<Schema> {
    let headers: Vec<String> = header_line.split('\t').map(|h| h.trim().to_string()).collect();
    let lower: Vec<String> = headers.iter().map(|h| h.to_ascii_lowercase()).collect();

    let timestamp_col = lower.iter().position(|h| TIMESTAMP_HEADERS.contains(&h.as_str()))?;
    let device_col = lower.iter().position(|h| DEVICE_HEADERS.contains(&h.as_str()));

    let field_cols = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != timestamp_col && Some(*i) != device_col)
        .map(|(i, h)| (i, h.clone()))
        .collect();

    Some(Schema {
        timestamp_col,
        device_col,
        field_cols,
    })
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.3f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok()
}

#[derive(Debug, Default)]
pub struct McsAmhsParser;

impl LogParser for McsAmhsParser {
    fn name(&self) -> &'static str {
        "mcs-amhs"
    }

    fn can_parse(&self, head: &str) -> bool {
        head.lines().any(|line| {
            let lower = line.to_ascii_lowercase();
            SNIFF_TOKENS.iter().any(|token| lower.contains(token))
        })
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
        let mut schema: Option<Schema> = None;
        let mut bytes_read: u64 = 0;
        let mut line_number: u64 = 0;

        for line in reader.lines() {
            line_number += 1;
            let line = line?;
            bytes_read += line.len() as u64 + 1;

            if line.trim().is_empty() {
                continue;
            }
            if schema.is_none() {
                schema = resolve_schema(&line);
                continue;
            }
            let schema = schema.as_ref().expect("header resolved before first data row");
            let fields: Vec<&str> = line.split('\t').collect();
            if schema.timestamp_col >= fields.len() {
                errors.push(ParseError {
                    line_number,
                    raw_line: line.clone(),
                    reason: "row is missing the timestamp column".to_string(),
                });
                continue;
            }
            let Some(timestamp_millis) = parse_timestamp(fields[schema.timestamp_col].trim())
            else {
                errors.push(ParseError {
                    line_number,
                    raw_line: line.clone(),
                    reason: format!("invalid timestamp {:?}", fields[schema.timestamp_col]),
                });
                continue;
            };
            let device_id = schema
                .device_col
                .and_then(|i| fields.get(i))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "AMHS".to_string());

            let mut emitted = 0;
            for (col, signal_name) in &schema.field_cols {
                let Some(raw_value) = fields.get(*col).map(|s| s.trim()) else { continue };
                if raw_value.is_empty() {
                    continue;
                }
                let entry = LogEntry {
                    timestamp_millis,
                    device_id: device_id.clone(),
                    signal_name: signal_name.clone(),
                    value: super::csv::infer_value(raw_value),
                    category: None,
                    line_number,
                    raw_line: Some(line.clone()),
                    source_id: None,
                };
                signals.insert(entry.signal_key());
                entries.push(entry);
                emitted += 1;
            }
            if emitted == 0 {
                errors.push(ParseError {
                    line_number,
                    raw_line: line.clone(),
                    reason: "row carried no populated key=value columns".to_string(),
                });
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
            "Timestamp\tEquipmentID\tCarrierID\tCurrentLocation",
            "2024-01-01 00:00:00.000\tOHT-1\tCAR-100\tSTB-A",
            "2024-01-01 00:00:01.000\tOHT-1\t\tSTB-B",
        ]
        .join("\n")
    }

    #[test]
    fn recognizes_a_header_naming_carrier_or_location_columns() {
        assert!(McsAmhsParser.can_parse(&sample()));
    }

    #[test]
    fn fans_one_row_out_into_one_entry_per_populated_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcs.tsv");
        std::fs::write(&path, sample()).unwrap();

        let (entries, errors, summary) = McsAmhsParser.parse(&path).unwrap();
        assert!(errors.is_empty());
        // Row 1: CarrierID + CurrentLocation = 2 entries. Row 2: CurrentLocation only = 1 entry.
        assert_eq!(entries.len(), 3);
        assert_eq!(summary.signal_count, 2);
        assert!(entries.iter().all(|e| e.device_id == "OHT-1"));
        assert!(entries[0..2]
            .iter()
            .all(|e| e.timestamp_millis == entries[0].timestamp_millis));
    }
}
