use serde::{Deserialize, Serialize};
use tv_contracts::{FileId, SignalKey};

/// The type tag carried alongside a [`LogEntry`]'s value, per spec.md §3: "a `(deviceId,
/// signalName)` pair has a single `signalType` across its lifetime."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Boolean,
    Integer,
    String,
}

impl SignalType {
    pub fn label(&self) -> &'static str {
        match self {
            SignalType::Boolean => "boolean",
            SignalType::Integer => "integer",
            SignalType::String => "string",
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A typed signal value, carried as a string on the wire and in storage (the columnar store's
/// `value` column is always text; `signal_type` tells readers how to interpret it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Boolean(bool),
    Integer(i64),
    String(String),
}

impl SignalValue {
    pub fn signal_type(&self) -> SignalType {
        match self {
            SignalValue::Boolean(_) => SignalType::Boolean,
            SignalValue::Integer(_) => SignalType::Integer,
            SignalValue::String(_) => SignalType::String,
        }
    }

    /// Renders the value the way it is stored in the columnar store's text column.
    pub fn to_storage_string(&self) -> String {
        match self {
            SignalValue::Boolean(b) => if *b { "ON".to_string() } else { "OFF".to_string() },
            SignalValue::Integer(i) => i.to_string(),
            SignalValue::String(s) => s.clone(),
        }
    }

    /// Parses a stored text value back into a typed value given its declared type.
    pub fn from_storage_string(raw: &str, signal_type: SignalType) -> Self {
        match signal_type {
            SignalType::Boolean => {
                let truthy = matches!(raw.to_ascii_uppercase().as_str(), "ON" | "TRUE" | "1");
                SignalValue::Boolean(truthy)
            }
            SignalType::Integer => SignalValue::Integer(raw.parse().unwrap_or_default()),
            SignalType::String => SignalValue::String(raw.to_string()),
        }
    }
}

/// One structured record parsed from a log line (or, for MCS/AMHS multi-value lines, one of
/// several records sharing a timestamp). See spec.md §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp_millis: i64,
    pub device_id: String,
    pub signal_name: String,
    pub value: SignalValue,
    pub category: Option<String>,
    pub line_number: u64,
    pub raw_line: Option<String>,
    /// Set when this entry originated from a merged multi-file session.
    pub source_id: Option<FileId>,
}

impl LogEntry {
    pub fn signal_key(&self) -> SignalKey {
        SignalKey::new(&self.device_id, &self.signal_name)
    }

    pub fn signal_type(&self) -> SignalType {
        self.value.signal_type()
    }
}

/// A line that could not be decoded by the active parser. Accumulated per session; never fails
/// the whole parse (spec.md §7, *Parse-line* errors).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseError {
    pub line_number: u64,
    pub raw_line: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_round_trips_through_storage_string() {
        let value = SignalValue::Boolean(true);
        let stored = value.to_storage_string();
        let parsed = SignalValue::from_storage_string(&stored, SignalType::Boolean);
        assert_eq!(value, parsed);
    }

    #[test]
    fn signal_key_matches_device_and_signal() {
        let entry = LogEntry {
            timestamp_millis: 0,
            device_id: "SYS/DEV-1".to_string(),
            signal_name: "IN:S1".to_string(),
            value: SignalValue::Boolean(true),
            category: None,
            line_number: 1,
            raw_line: None,
            source_id: None,
        };
        assert_eq!(entry.signal_key().as_str(), "SYS/DEV-1::IN:S1");
    }
}
