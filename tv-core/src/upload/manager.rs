//! Async job executor: assemble → validate magic → streaming decompress → register
//! (spec.md §4.2).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tv_contracts::UploadJobId;
use tv_model::{FileStatus, UploadEncoding, UploadJob, UploadStage};

use crate::file_store::SharedRawFileStore;
use crate::progress::{ProgressPublisher, ProgressSubscriber};

use super::gzip;

/// Async job executor for chunked, optionally gzip-compressed uploads. One worker per job; many
/// jobs may run concurrently (spec.md §4.2 "Concurrency").
#[derive(Debug)]
pub struct UploadManager {
    file_store: SharedRawFileStore,
    jobs: RwLock<HashMap<UploadJobId, ProgressPublisher<UploadJob>>>,
}

impl UploadManager {
    pub fn new(file_store: SharedRawFileStore) -> Arc<Self> {
        Arc::new(Self {
            file_store,
            jobs: RwLock::new(HashMap::new()),
        })
    }

    /// Starts an assembly job asynchronously and returns its id immediately; progress is
    /// observed via [`UploadManager::subscribe`].
    pub async fn start_job(
        self: &Arc<Self>,
        upload_id: impl Into<String>,
        name: impl Into<String>,
        total_chunks: u32,
        original_size: u64,
        compressed_size: u64,
        encoding: UploadEncoding,
    ) -> UploadJobId {
        let job = UploadJob::new(upload_id, name, total_chunks, original_size, compressed_size, encoding);
        let job_id = job.job_id;
        let (publisher, _) = ProgressPublisher::new(job);
        self.jobs.write().await.insert(job_id, publisher);

        let this = self.clone();
        tokio::spawn(async move {
            if let Err(panic) = tokio::spawn(this.clone().run_job(job_id)).await {
                error!(%job_id, ?panic, "upload job worker panicked");
                this.fail_job(job_id, "internal error: worker panicked").await;
            }
        });

        job_id
    }

    pub async fn subscribe(&self, job_id: UploadJobId) -> Option<ProgressSubscriber<UploadJob>> {
        self.jobs.read().await.get(&job_id).map(|p| p.subscribe())
    }

    pub async fn get(&self, job_id: UploadJobId) -> Option<UploadJob> {
        self.jobs.read().await.get(&job_id).map(|p| p.current())
    }

    async fn run_job(self: Arc<Self>, job_id: UploadJobId) {
        let (upload_id, name, total_chunks, original_size, encoding) = {
            let jobs = self.jobs.read().await;
            let Some(publisher) = jobs.get(&job_id) else {
                return;
            };
            let job = publisher.current();
            (
                job.upload_id.clone(),
                job.file_name.clone(),
                job.total_chunks,
                job.original_size,
                job.encoding,
            )
        };

        // Stage 1: assemble.
        self.publish_stage(job_id, UploadStage::Assembling, 0.0).await;
        let assembled = match self
            .file_store
            .complete_chunked_upload(&upload_id, &name, total_chunks)
            .await
        {
            Ok(info) => info,
            Err(err) => {
                warn!(%job_id, error = %err, "upload assembly failed");
                self.fail_job(job_id, err.to_string()).await;
                return;
            }
        };
        self.publish_stage(job_id, UploadStage::Assembling, 100.0).await;

        // Stage 2: decompress, only for gzip uploads.
        if encoding == UploadEncoding::Gzip {
            let path = self.file_store.get_file_path(assembled.id);
            let publisher_job_id = job_id;
            let this = self.clone();
            let decompress_result = tokio::task::spawn_blocking(move || {
                gzip::decompress_blocking(&path, original_size, move |written| {
                    let fraction = if original_size == 0 {
                        100.0
                    } else {
                        (written as f64 / original_size as f64) * 100.0
                    };
                    let this = this.clone();
                    tokio::spawn(async move {
                        this.publish_stage(publisher_job_id, UploadStage::Decompressing, fraction)
                            .await;
                    });
                })
            })
            .await;

            match decompress_result {
                Ok(Ok(written)) => {
                    self.file_store.set_size(assembled.id, written).await;
                }
                Ok(Err(err)) => {
                    warn!(%job_id, error = %err, "decompression failed");
                    let _ = self.file_store.delete(assembled.id).await;
                    self.fail_job(job_id, err.to_string()).await;
                    return;
                }
                Err(panic) => {
                    error!(%job_id, ?panic, "decompression worker panicked");
                    let _ = self.file_store.delete(assembled.id).await;
                    self.fail_job(job_id, "internal error: decompression panicked").await;
                    return;
                }
            }
        }

        self.file_store.set_status(assembled.id, FileStatus::Uploaded).await;
        let Some(file_info) = self.file_store.get(assembled.id).await else {
            self.fail_job(job_id, "assembled file vanished before completion").await;
            return;
        };

        let mut jobs = self.jobs.write().await;
        if let Some(publisher) = jobs.get_mut(&job_id) {
            let mut job = publisher.current();
            job.mark_complete(file_info);
            publisher.publish(job);
        }
        info!(%job_id, "upload job complete");
    }

    async fn publish_stage(&self, job_id: UploadJobId, stage: UploadStage, stage_progress: f64) {
        let jobs = self.jobs.read().await;
        if let Some(publisher) = jobs.get(&job_id) {
            let mut job = publisher.current();
            job.set_stage_progress(stage, stage_progress);
            publisher.publish(job);
        }
    }

    async fn fail_job(&self, job_id: UploadJobId, reason: impl Into<String>) {
        let jobs = self.jobs.read().await;
        if let Some(publisher) = jobs.get(&job_id) {
            let mut job = publisher.current();
            job.mark_error(reason);
            publisher.publish(job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tv_model::UploadStage;

    async fn store() -> SharedRawFileStore {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(crate::file_store::RawFileStore::open(dir.path().to_path_buf()).await.unwrap())
    }

    #[tokio::test]
    async fn plain_upload_reaches_complete() {
        let store = store().await;
        let manager = UploadManager::new(store.clone());
        store.save_chunk("u1", 0, b"hello ").await.unwrap();
        store.save_chunk("u1", 1, b"world").await.unwrap();

        let job_id = manager
            .start_job("u1", "trace.log", 2, 11, 11, UploadEncoding::None)
            .await;

        let mut sub = manager.subscribe(job_id).await.unwrap();
        let mut last = sub.current();
        while !last.is_terminal() {
            last = sub.changed().await.unwrap();
        }
        assert_eq!(last.stage, UploadStage::Complete);
        assert!(last.file_info.is_some());
    }

    #[tokio::test]
    async fn gzip_size_mismatch_errors_and_removes_raw_file() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let store = store().await;
        let manager = UploadManager::new(store.clone());

        let raw = b"0123456789".repeat(100);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let compressed = encoder.finish().unwrap();

        store.save_chunk("u2", 0, &compressed).await.unwrap();
        let job_id = manager
            .start_job(
                "u2",
                "trace.log.gz",
                1,
                raw.len() as u64 + 1, // deliberately wrong
                compressed.len() as u64,
                UploadEncoding::Gzip,
            )
            .await;

        let mut sub = manager.subscribe(job_id).await.unwrap();
        let mut last = sub.current();
        while !last.is_terminal() {
            last = sub.changed().await.unwrap();
        }
        assert_eq!(last.stage, UploadStage::Error);
        assert!(last.error.unwrap().contains("decompressed size mismatch"));
    }
}
