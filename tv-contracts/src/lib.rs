//! Opaque identifier newtypes and small cross-cutting value types shared by every
//! crate in the log ingestion workspace.

pub mod id;
pub mod signal_key;

pub use id::{FileId, SessionId, UploadJobId};
pub use signal_key::SignalKey;
