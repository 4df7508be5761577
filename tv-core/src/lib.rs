//! Ingestion and query engine: raw file storage, chunked upload assembly, format-sniffing
//! parsers, a columnar entry store, and the session manager that ties them together.

pub mod cancel;
pub mod columnar;
pub mod error;
pub mod file_store;
pub mod intern;
pub mod parse;
pub mod progress;
pub mod query;
pub mod session;
pub mod upload;

pub use cancel::CancellationContext;
pub use error::{EngineError, Result};
pub use file_store::{RawFileStore, SharedRawFileStore};
pub use query::QueryExecutor;
pub use session::SessionManager;
