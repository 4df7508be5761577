//! Shared service handles threaded through every handler (spec.md/SPEC_FULL.md §4).

use std::fmt;
use std::sync::Arc;

use tv_core::columnar::ParsedStoreCatalog;
use tv_core::file_store::SharedRawFileStore;
use tv_core::upload::UploadManager;
use tv_core::{QueryExecutor, SessionManager};

use crate::config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub file_store: SharedRawFileStore,
    pub catalog: Arc<ParsedStoreCatalog>,
    pub uploads: Arc<UploadManager>,
    pub sessions: Arc<SessionManager>,
    pub query: Arc<QueryExecutor>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
