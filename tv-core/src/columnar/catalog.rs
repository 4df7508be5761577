//! Tracks which raw files already have a parsed, persisted [`ColumnarStore`] on disk
//! (spec.md §4.5).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tv_contracts::FileId;

use crate::error::{EngineError, Result};

use super::store::ColumnarStore;

fn store_file_name(file_id: FileId) -> String {
    format!("file_{file_id}.db")
}

fn parse_store_file_name(name: &str) -> Option<FileId> {
    name.strip_prefix("file_")?.strip_suffix(".db")?.parse().ok()
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    complete: bool,
}

/// Aggregate statistics over the catalog's directory (spec.md §4.5 `stats`).
#[derive(Debug, Clone)]
pub struct CatalogStats {
    pub count: usize,
    pub total_bytes: u64,
    pub dir: PathBuf,
}

/// Persistent record of which files have a completed, queryable parsed store. One process-wide
/// instance backs every [`crate::session::SessionManager`] (spec.md §4.5).
#[derive(Debug)]
pub struct ParsedStoreCatalog {
    dir: PathBuf,
    index: RwLock<HashMap<FileId, Entry>>,
}

impl ParsedStoreCatalog {
    /// Opens the catalog directory, scanning it for existing `file_<id>.db` entries. Tolerates
    /// per-entry I/O errors during the scan (spec.md §4.5 "Startup scan").
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        let catalog = Self {
            dir,
            index: RwLock::new(HashMap::new()),
        };
        catalog.scan().await;
        Ok(catalog)
    }

    async fn scan(&self) {
        let mut read_dir = match fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(err) => {
                warn!(error = %err, "failed to scan parsed-store catalog directory");
                return;
            }
        };
        let mut discovered = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.ok().flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
            let Some(file_id) = parse_store_file_name(&name) else { continue };
            if entry.metadata().await.map(|m| m.is_file()).unwrap_or(false) {
                discovered.push(file_id);
            }
        }
        let mut index = self.index.write().await;
        for file_id in discovered {
            index.entry(file_id).or_insert(Entry { complete: true });
        }
        info!(count = index.len(), "scanned parsed-store catalog");
    }

    fn path_for(&self, file_id: FileId) -> PathBuf {
        self.dir.join(store_file_name(file_id))
    }

    /// Checks the in-memory map first; on miss, stat-probes disk and inserts the entry if the
    /// file is present (spec.md §4.5 "Cache consistency"). An entry recorded as incomplete (a
    /// store still being written, or left behind by a crash mid-parse) does not count as parsed.
    pub async fn is_parsed(&self, file_id: FileId) -> bool {
        if let Some(entry) = self.index.read().await.get(&file_id) {
            return entry.complete;
        }
        if fs::metadata(self.path_for(file_id)).await.is_ok() {
            self.index.write().await.insert(file_id, Entry { complete: true });
            return true;
        }
        false
    }

    /// Opens a previously completed store read-only, or `None` if not parsed.
    pub async fn open_store(&self, file_id: FileId) -> Result<Option<Arc<ColumnarStore>>> {
        if !self.is_parsed(file_id).await {
            return Ok(None);
        }
        let path = self.path_for(file_id);
        let store = tokio::task::spawn_blocking(move || ColumnarStore::open_read_only(path))
            .await
            .map_err(|err| EngineError::Internal(err.to_string()))??;
        Ok(Some(Arc::new(store)))
    }

    /// Creates a new writable store for `file_id`. The entry is recorded as incomplete until
    /// [`ParsedStoreCatalog::mark_complete`] is called, so a crash mid-parse leaves no false
    /// "parsed" entry for [`ParsedStoreCatalog::is_parsed`] to report.
    pub async fn create_for_file(&self, file_id: FileId) -> Result<Arc<ColumnarStore>> {
        let path = self.path_for(file_id);
        let store = tokio::task::spawn_blocking({
            let path = path.clone();
            move || ColumnarStore::create(path)
        })
        .await
        .map_err(|err| EngineError::Internal(err.to_string()))??;
        self.index.write().await.insert(file_id, Entry { complete: false });
        Ok(Arc::new(store))
    }

    pub async fn mark_complete(&self, file_id: FileId) {
        self.index
            .write()
            .await
            .entry(file_id)
            .or_insert(Entry { complete: false })
            .complete = true;
    }

    /// Removes both the on-disk store and the catalog entry. Idempotent.
    pub async fn delete(&self, file_id: FileId) -> Result<()> {
        self.index.write().await.remove(&file_id);
        match fs::remove_file(self.path_for(file_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes every catalog entry whose file id is not present in `known_file_ids`
    /// (spec.md §4.5 "Orphan collection").
    pub async fn cleanup_orphaned(&self, known_file_ids: &[FileId]) -> Result<usize> {
        let known: std::collections::HashSet<_> = known_file_ids.iter().copied().collect();
        let orphaned: Vec<FileId> = self
            .index
            .read()
            .await
            .keys()
            .copied()
            .filter(|id| !known.contains(id))
            .collect();
        for id in &orphaned {
            self.delete(*id).await?;
        }
        Ok(orphaned.len())
    }

    pub async fn stats(&self) -> Result<CatalogStats> {
        let index = self.index.read().await;
        let mut total_bytes = 0u64;
        for file_id in index.keys() {
            if let Ok(meta) = fs::metadata(self.path_for(*file_id)).await {
                total_bytes += meta.len();
            }
        }
        Ok(CatalogStats {
            count: index.len(),
            total_bytes,
            dir: self.dir.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_mark_complete_then_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ParsedStoreCatalog::open(dir.path()).await.unwrap();
        let file_id = FileId::new();

        assert!(!catalog.is_parsed(file_id).await);
        let _store = catalog.create_for_file(file_id).await.unwrap();
        catalog.mark_complete(file_id).await;
        assert!(catalog.is_parsed(file_id).await);
    }

    #[tokio::test]
    async fn is_parsed_is_false_while_a_store_is_still_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ParsedStoreCatalog::open(dir.path()).await.unwrap();
        let file_id = FileId::new();

        let _store = catalog.create_for_file(file_id).await.unwrap();
        assert!(!catalog.is_parsed(file_id).await, "a store with no mark_complete call is not parsed yet");

        catalog.mark_complete(file_id).await;
        assert!(catalog.is_parsed(file_id).await);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ParsedStoreCatalog::open(dir.path()).await.unwrap();
        let file_id = FileId::new();
        catalog.create_for_file(file_id).await.unwrap();
        catalog.mark_complete(file_id).await;

        catalog.delete(file_id).await.unwrap();
        assert!(!catalog.is_parsed(file_id).await);
        catalog.delete(file_id).await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_orphaned_removes_entries_outside_the_known_set() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ParsedStoreCatalog::open(dir.path()).await.unwrap();
        let keep = FileId::new();
        let drop_me = FileId::new();
        catalog.create_for_file(keep).await.unwrap();
        catalog.mark_complete(keep).await;
        catalog.create_for_file(drop_me).await.unwrap();

        let removed = catalog.cleanup_orphaned(&[keep]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(catalog.is_parsed(keep).await);
        assert!(!catalog.is_parsed(drop_me).await);
    }
}
