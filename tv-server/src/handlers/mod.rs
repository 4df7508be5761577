pub mod files;
pub mod jobs;
pub mod query;
pub mod sessions;
pub mod upload;
