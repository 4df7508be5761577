//! Session admission, parse dispatch, and the query surface exposed to a client
//! (spec.md §4.6).

mod manager;
mod memory_query;
mod merge;

pub use manager::SessionManager;
