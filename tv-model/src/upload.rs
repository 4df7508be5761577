use serde::{Deserialize, Serialize};
use tv_contracts::{FileId, UploadJobId};

use crate::file_info::FileInfo;

/// Whether a completed chunked upload is a plain file or gzip-compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadEncoding {
    None,
    Gzip,
}

/// The stage an [`UploadJob`] is currently in. See spec.md §4.2 for the progress mapping:
/// `assembling` spans 0-40% of overall progress, `decompressing` spans 40-90%, `complete` is 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    Assembling,
    Decompressing,
    Complete,
    Error,
}

impl UploadStage {
    /// Overall-progress span `[start, end)` this stage contributes, per spec.md §4.2.
    pub fn overall_span(&self) -> (f64, f64) {
        match self {
            UploadStage::Assembling => (0.0, 40.0),
            UploadStage::Decompressing => (40.0, 90.0),
            UploadStage::Complete => (100.0, 100.0),
            UploadStage::Error => (0.0, 0.0),
        }
    }
}

/// A chunked-upload assembly job: assemble → (decompress) → complete | error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub job_id: UploadJobId,
    pub upload_id: String,
    pub file_name: String,
    pub total_chunks: u32,
    pub original_size: u64,
    pub compressed_size: u64,
    pub encoding: UploadEncoding,
    pub stage: UploadStage,
    pub stage_progress: f64,
    pub overall_progress: f64,
    pub error: Option<String>,
    pub file_info: Option<FileInfo>,
}

impl UploadJob {
    pub fn new(
        upload_id: impl Into<String>,
        file_name: impl Into<String>,
        total_chunks: u32,
        original_size: u64,
        compressed_size: u64,
        encoding: UploadEncoding,
    ) -> Self {
        Self {
            job_id: UploadJobId::new(),
            upload_id: upload_id.into(),
            file_name: file_name.into(),
            total_chunks,
            original_size,
            compressed_size,
            encoding,
            stage: UploadStage::Assembling,
            stage_progress: 0.0,
            overall_progress: 0.0,
            error: None,
            file_info: None,
        }
    }

    /// Recomputes `overall_progress` from `stage` and `stage_progress`, clamping to the stage's
    /// span and never decreasing (spec.md §5: "progressPercent ... is monotonically non-decreasing").
    pub fn set_stage_progress(&mut self, stage: UploadStage, stage_progress: f64) {
        let stage_progress = stage_progress.clamp(0.0, 100.0);
        let (start, end) = stage.overall_span();
        let overall = start + (end - start) * (stage_progress / 100.0);
        self.stage = stage;
        self.stage_progress = stage_progress;
        self.overall_progress = overall.max(self.overall_progress);
    }

    pub fn mark_complete(&mut self, file_info: FileInfo) {
        self.stage = UploadStage::Complete;
        self.stage_progress = 100.0;
        self.overall_progress = 100.0;
        self.file_info = Some(file_info);
    }

    pub fn mark_error(&mut self, reason: impl Into<String>) {
        self.stage = UploadStage::Error;
        self.error = Some(reason.into());
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, UploadStage::Complete | UploadStage::Error)
    }
}

/// Request to finish a chunked upload, handed from the raw file store to the upload manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteUploadRequest {
    pub upload_id: String,
    pub name: String,
    pub total_chunks: u32,
    pub original_size: u64,
    pub compressed_size: u64,
    pub encoding: UploadEncoding,
}

/// Result handed back once the raw file store has concatenated all chunks.
#[derive(Debug, Clone)]
pub struct AssembledUpload {
    pub file_id: FileId,
    pub byte_len: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_never_decreases_across_stage_transition() {
        let mut job = UploadJob::new("u1", "f.log.gz", 4, 1000, 400, UploadEncoding::Gzip);
        job.set_stage_progress(UploadStage::Assembling, 100.0);
        assert_eq!(job.overall_progress, 40.0);
        job.set_stage_progress(UploadStage::Decompressing, 0.0);
        // 40.0 is the floor of the decompressing span, so progress holds rather than dropping.
        assert_eq!(job.overall_progress, 40.0);
        job.set_stage_progress(UploadStage::Decompressing, 50.0);
        assert_eq!(job.overall_progress, 65.0);
    }

    #[test]
    fn complete_reaches_one_hundred() {
        let mut job = UploadJob::new("u2", "f.log", 1, 10, 10, UploadEncoding::None);
        job.mark_complete(FileInfo::new("f.log", 10));
        assert_eq!(job.overall_progress, 100.0);
        assert!(job.is_terminal());
    }
}
