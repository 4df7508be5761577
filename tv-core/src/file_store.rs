//! Durable storage of uploaded bytes, keyed by [`FileId`], plus the chunk staging area used
//! during a chunked upload (spec.md §4.1).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use tv_contracts::FileId;
use tv_model::{FileInfo, FileStatus};

use crate::error::{EngineError, Result};

/// Durable, UUID-keyed storage for raw uploaded files and their in-flight chunks.
///
/// Index operations are reader-writer locked; filesystem operations are unlocked because
/// per-file paths are disjoint (spec.md §4.1 "Concurrency").
#[derive(Debug)]
pub struct RawFileStore {
    root: PathBuf,
    index: RwLock<HashMap<FileId, FileInfo>>,
}

impl RawFileStore {
    /// Opens (creating if needed) a raw file store rooted at `root`, with no files indexed yet.
    /// Callers that need to recover an index across restarts should call [`RawFileStore::rescan`].
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(root.join("chunks")).await?;
        Ok(Self {
            root,
            index: RwLock::new(HashMap::new()),
        })
    }

    fn file_path(&self, id: FileId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn chunk_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join("chunks").join(upload_id)
    }

    pub fn get_file_path(&self, id: FileId) -> PathBuf {
        self.file_path(id)
    }

    /// Streams `bytes` into a new UUID-keyed file and registers it in the index.
    pub async fn save(&self, name: impl Into<String>, bytes: &[u8]) -> Result<FileInfo> {
        let info = FileInfo::new(name, bytes.len() as u64);
        let path = self.file_path(info.id);
        if let Err(err) = write_atomic(&path, bytes).await {
            let _ = fs::remove_file(&path).await;
            return Err(err);
        }
        self.index.write().await.insert(info.id, info.clone());
        info!(file_id = %info.id, "saved raw file");
        Ok(info)
    }

    /// Appends one chunk of an in-progress chunked upload. Safe for concurrent indices under the
    /// same `upload_id`; directory creation is idempotent (spec.md §4.1).
    pub async fn save_chunk(&self, upload_id: &str, index: u32, bytes: &[u8]) -> Result<()> {
        let dir = self.chunk_dir(upload_id);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("chunk_{index}"));
        write_atomic(&path, bytes).await?;
        debug!(upload_id, index, "stored chunk");
        Ok(())
    }

    /// Concatenates `chunk_0 .. chunk_{total-1}` in order into a new UUID-keyed file, then
    /// removes the chunk directory. A missing chunk is fatal (spec.md §4.1 "Failure semantics").
    pub async fn complete_chunked_upload(
        &self,
        upload_id: &str,
        name: impl Into<String>,
        total_chunks: u32,
    ) -> Result<FileInfo> {
        let dir = self.chunk_dir(upload_id);
        let info = FileInfo::new(name, 0);
        let dest_path = self.file_path(info.id);
        let mut dest = fs::File::create(&dest_path).await?;
        let mut total_len: u64 = 0;

        for i in 0..total_chunks {
            let chunk_path = dir.join(format!("chunk_{i}"));
            let bytes = match fs::read(&chunk_path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    drop(dest);
                    let _ = fs::remove_file(&dest_path).await;
                    return Err(EngineError::Integrity(format!(
                        "missing chunk {i} of {total_chunks} for upload {upload_id}: {err}"
                    )));
                }
            };
            if let Err(err) = dest.write_all(&bytes).await {
                drop(dest);
                let _ = fs::remove_file(&dest_path).await;
                return Err(err.into());
            }
            total_len += bytes.len() as u64;
        }
        dest.flush().await?;
        drop(dest);

        let _ = fs::remove_dir_all(&dir).await;

        let mut info = info;
        info.size_bytes = total_len;
        self.index.write().await.insert(info.id, info.clone());
        info!(file_id = %info.id, total_chunks, total_len, "assembled chunked upload");
        Ok(info)
    }

    pub async fn get(&self, id: FileId) -> Option<FileInfo> {
        self.index.read().await.get(&id).cloned()
    }

    pub async fn list(&self, limit: usize, newest_first: bool) -> Vec<FileInfo> {
        let index = self.index.read().await;
        let mut files: Vec<FileInfo> = index.values().cloned().collect();
        files.sort_by_key(|f| f.uploaded_at);
        if newest_first {
            files.reverse();
        }
        files.truncate(limit);
        files
    }

    /// Idempotent: deleting a file that doesn't exist succeeds silently (spec.md §4.1).
    pub async fn delete(&self, id: FileId) -> Result<()> {
        self.index.write().await.remove(&id);
        let path = self.file_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn rename(&self, id: FileId, new_name: impl Into<String>) -> Result<FileInfo> {
        let mut index = self.index.write().await;
        let info = index
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("file", id.to_string()))?;
        info.name = new_name.into();
        Ok(info.clone())
    }

    pub async fn set_status(&self, id: FileId, status: FileStatus) {
        if let Some(info) = self.index.write().await.get_mut(&id) {
            info.status = status;
        }
    }

    pub async fn set_size(&self, id: FileId, size_bytes: u64) {
        if let Some(info) = self.index.write().await.get_mut(&id) {
            info.size_bytes = size_bytes;
        }
    }

    /// Repopulates the in-memory index by scanning `root` for files whose name parses as a
    /// [`FileId`]. Tolerates unreadable entries, matching the catalog's own startup scan
    /// (spec.md §4.5).
    pub async fn rescan(&self) -> Result<()> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) => {
                warn!(error = %err, "failed to rescan raw file store");
                return Ok(());
            }
        };
        let mut discovered = Vec::new();
        while let Some(entry) = dir.next_entry().await.ok().flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else { continue };
            let Ok(id) = name.parse::<FileId>() else { continue };
            let Ok(metadata) = entry.metadata().await else { continue };
            if !metadata.is_file() {
                continue;
            }
            discovered.push((id, metadata.len()));
        }
        let mut index = self.index.write().await;
        for (id, len) in discovered {
            index.entry(id).or_insert_with(|| FileInfo {
                id,
                name: id.to_string(),
                size_bytes: len,
                uploaded_at: chrono::Utc::now(),
                status: FileStatus::Uploaded,
            });
        }
        Ok(())
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

pub type SharedRawFileStore = Arc<RawFileStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_get_then_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawFileStore::open(dir.path()).await.unwrap();

        let info = store.save("trace.log", b"hello world").await.unwrap();
        let fetched = store.get(info.id).await.unwrap();
        assert_eq!(fetched, info);

        store.delete(info.id).await.unwrap();
        assert!(store.get(info.id).await.is_none());
        // Deleting again must not error.
        store.delete(info.id).await.unwrap();
    }

    #[tokio::test]
    async fn chunked_upload_concatenates_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawFileStore::open(dir.path()).await.unwrap();

        store.save_chunk("up1", 0, b"AAA").await.unwrap();
        store.save_chunk("up1", 1, b"BBB").await.unwrap();
        store.save_chunk("up1", 2, b"CCC").await.unwrap();

        let info = store
            .complete_chunked_upload("up1", "trace.log", 3)
            .await
            .unwrap();
        assert_eq!(info.size_bytes, 9);

        let bytes = tokio::fs::read(store.get_file_path(info.id)).await.unwrap();
        assert_eq!(bytes, b"AAABBBCCC");
        assert!(!store.chunk_dir("up1").exists());
    }

    #[tokio::test]
    async fn missing_chunk_fails_assembly_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawFileStore::open(dir.path()).await.unwrap();

        store.save_chunk("up2", 0, b"AAA").await.unwrap();
        // chunk_1 never written.
        let result = store.complete_chunked_upload("up2", "trace.log", 2).await;
        assert!(result.is_err());
    }
}
