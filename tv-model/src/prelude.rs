//! Frequently used types, re-exported for downstream crates.

pub use crate::entry::{LogEntry, ParseError, SignalType, SignalValue};
pub use crate::error::{ModelError, Result as ModelResult};
pub use crate::file_info::{FileInfo, FileStatus};
pub use crate::query::{
    BoundaryValues, EntryPage, QueryFilters, SearchMode, SortBy, SortOrder, TimeRange,
    TimeTreeNode,
};
pub use crate::session::{ParseSession, SessionStatus};
pub use crate::upload::{AssembledUpload, CompleteUploadRequest, UploadEncoding, UploadJob, UploadStage};
