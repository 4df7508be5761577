use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tv_contracts::{FileId, SessionId};

use crate::entry::ParseError;

/// Lifecycle status of a [`ParseSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Parsing,
    Complete,
    Error,
}

/// A client-bound parse job plus its resulting query surface. Exactly one per client request;
/// may outlive the client briefly via TTL (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseSession {
    pub id: SessionId,
    pub file_ids: Vec<FileId>,
    pub status: SessionStatus,
    pub progress_percent: f64,
    pub start_time_millis: i64,
    pub end_time_millis: Option<i64>,
    pub entry_count: u64,
    pub signal_count: u64,
    pub parser_name: Option<String>,
    pub errors: Vec<ParseError>,
    pub processing_time_millis: Option<i64>,
    #[serde(skip)]
    pub last_accessed: Option<DateTime<Utc>>,
}

impl ParseSession {
    pub fn new(file_ids: Vec<FileId>) -> Self {
        Self {
            id: SessionId::new(),
            file_ids,
            status: SessionStatus::Pending,
            progress_percent: 0.0,
            start_time_millis: Utc::now().timestamp_millis(),
            end_time_millis: None,
            entry_count: 0,
            signal_count: 0,
            parser_name: None,
            errors: Vec::new(),
            processing_time_millis: None,
            last_accessed: Some(Utc::now()),
        }
    }

    pub fn single(file_id: FileId) -> Self {
        Self::new(vec![file_id])
    }

    pub fn touch(&mut self) {
        self.last_accessed = Some(Utc::now());
    }

    /// True once the keep-alive window has elapsed since the last access (spec.md §3 invariant
    /// #4: "never evicted [...] within the keep-alive window").
    pub fn is_outside_keep_alive(&self, keep_alive: chrono::Duration) -> bool {
        match self.last_accessed {
            Some(last) => Utc::now() - last > keep_alive,
            None => true,
        }
    }

    pub fn is_evictable(&self) -> bool {
        matches!(self.status, SessionStatus::Complete | SessionStatus::Error)
    }

    /// Sets `progress_percent`, clamping into `[10, 89.9]` during parsing per spec.md §4.6 and
    /// never allowing it to decrease (spec.md §5).
    pub fn set_parsing_progress(&mut self, fraction_complete: f64) {
        let clamped = (10.0 + fraction_complete.clamp(0.0, 1.0) * 79.9).min(89.9);
        if clamped > self.progress_percent {
            self.progress_percent = clamped;
        }
        self.status = SessionStatus::Parsing;
    }

    pub fn mark_complete(
        &mut self,
        entry_count: u64,
        signal_count: u64,
        parser_name: impl Into<String>,
        errors: Vec<ParseError>,
    ) {
        let now = Utc::now().timestamp_millis();
        self.end_time_millis = Some(now);
        self.processing_time_millis = Some(now - self.start_time_millis);
        self.entry_count = entry_count;
        self.signal_count = signal_count;
        self.parser_name = Some(parser_name.into());
        self.errors = errors;
        self.status = SessionStatus::Complete;
        self.progress_percent = 100.0;
    }

    pub fn mark_error(&mut self, reason: impl Into<String>) {
        self.status = SessionStatus::Error;
        self.errors.push(ParseError {
            line_number: 0,
            raw_line: String::new(),
            reason: reason.into(),
        });
        self.end_time_millis = Some(Utc::now().timestamp_millis());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_progress_is_clamped_and_monotonic() {
        let mut session = ParseSession::single(FileId::new());
        session.set_parsing_progress(0.0);
        assert_eq!(session.progress_percent, 10.0);
        session.set_parsing_progress(1.5);
        assert_eq!(session.progress_percent, 89.9);
        session.set_parsing_progress(0.0);
        // Must not regress below a prior high-water mark.
        assert_eq!(session.progress_percent, 89.9);
    }

    #[test]
    fn complete_sessions_are_evictable_pending_ones_are_not() {
        let mut session = ParseSession::single(FileId::new());
        assert!(!session.is_evictable());
        session.mark_complete(10, 2, "bracket-plc", vec![]);
        assert!(session.is_evictable());
    }
}
