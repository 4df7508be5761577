use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tv_contracts::FileId;

/// Status of a raw uploaded file, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Uploaded,
    Parsing,
    Parsed,
}

impl FileStatus {
    pub fn all() -> &'static [FileStatus] {
        use FileStatus::*;
        &[Uploaded, Parsing, Parsed]
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Uploaded => "uploaded",
            FileStatus::Parsing => "parsing",
            FileStatus::Parsed => "parsed",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A raw uploaded file. Immutable except for `status` and `size_bytes` (the latter is rewritten
/// after gzip decompression to reflect the uncompressed length).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: FileId,
    pub name: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub status: FileStatus,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id: FileId::new(),
            name: name.into(),
            size_bytes,
            uploaded_at: Utc::now(),
            status: FileStatus::Uploaded,
        }
    }
}
