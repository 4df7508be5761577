//! Format-sniffing parser registry and the four recognized log dialects (spec.md §4.3).

mod bracket_plc;
mod csv;
mod mcs_amhs;
mod registry;
mod tab_plc;

pub use bracket_plc::BracketPlcParser;
pub use csv::CsvParser;
pub use mcs_amhs::McsAmhsParser;
pub use registry::{default_registry, ParserRegistry};
pub use tab_plc::TabPlcParser;

use std::path::Path;

use tv_model::ParseError;

use crate::error::Result;

/// Bytes of file head the registry shows each parser's `can_parse` before committing to it.
pub const SNIFF_HEAD_BYTES: usize = 8192;

/// Progress reported during a parse: lines consumed so far, bytes read so far, and the total
/// byte length of the input (spec.md §4.3 "Progress").
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseProgress {
    pub lines_processed: u64,
    pub bytes_read: u64,
    pub total_bytes: u64,
}

/// Aggregate result of a completed parse, independent of whether entries live in memory or were
/// streamed directly into a columnar store.
#[derive(Debug, Clone, Default)]
pub struct ParseSummary {
    pub entry_count: u64,
    pub signal_count: u64,
}

/// A destination for streamed entries. The columnar store implements this; tests use an
/// in-memory `Vec`. Decouples the parser layer from the storage layer (spec.md §4.3, §4.4).
pub trait EntrySink {
    fn append(&mut self, entries: &[tv_model::LogEntry]) -> Result<()>;
}

impl EntrySink for Vec<tv_model::LogEntry> {
    fn append(&mut self, entries: &[tv_model::LogEntry]) -> Result<()> {
        self.extend_from_slice(entries);
        Ok(())
    }
}

/// A single log-format dialect. Implementors are tried in registration order until one claims
/// the file via [`LogParser::can_parse`] (spec.md §4.3 "Sniffing").
pub trait LogParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inspects the decoded first [`SNIFF_HEAD_BYTES`] (or fewer, for short files) of the file
    /// and reports whether this parser recognizes the dialect.
    fn can_parse(&self, head: &str) -> bool;

    /// Parses the whole file into memory, discarding progress notifications.
    fn parse(&self, path: &Path) -> Result<(Vec<tv_model::LogEntry>, Vec<ParseError>, ParseSummary)> {
        self.parse_with_progress(path, &mut |_| {})
    }

    /// Parses the whole file into memory, invoking `on_progress` as lines are consumed. The
    /// caller (session manager) is responsible for rate-limiting calls into its own progress
    /// channel; parsers report every line they process.
    fn parse_with_progress(
        &self,
        path: &Path,
        on_progress: &mut dyn FnMut(ParseProgress),
    ) -> Result<(Vec<tv_model::LogEntry>, Vec<ParseError>, ParseSummary)>;
}

/// Extension for dialects large enough that materializing every entry in memory is unacceptable.
/// Entries are pushed directly into an [`EntrySink`] in batches (spec.md §4.3 "Memory
/// discipline").
pub trait StreamingLogParser: LogParser {
    fn parse_to_sink(
        &self,
        path: &Path,
        sink: &mut dyn EntrySink,
        on_progress: &mut dyn FnMut(ParseProgress),
    ) -> Result<(Vec<ParseError>, ParseSummary)>;
}

/// Files at or above this size must go through a [`StreamingLogParser`] rather than the
/// in-memory `parse`/`parse_with_progress` path (spec.md §4.3 "Memory discipline").
pub const STREAMING_THRESHOLD_BYTES: u64 = 64 * 1024 * 1024;
