use thiserror::Error;

/// Errors produced by the ingestion engine. Parse-line errors are data (`tv_model::ParseError`),
/// never a variant here — spec.md §7 draws that line explicitly.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("columnar store error: {0}")]
    Store(#[from] duckdb::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("store for file {0} is locked by another session")]
    Locked(String),

    #[error("parse failed: {0}")]
    ParseFatal(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
