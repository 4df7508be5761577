//! Domain and wire types shared between the ingestion engine and its HTTP/WebSocket surface.

pub mod entry;
pub mod error;
pub mod file_info;
pub mod prelude;
pub mod query;
pub mod session;
pub mod upload;

pub use prelude::*;
