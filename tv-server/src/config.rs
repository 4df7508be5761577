//! Environment-driven startup configuration (spec.md/SPEC_FULL.md §6).
//!
//! Every variable is read once at startup and falls back to a relative path under the process
//! working directory, matching §6's "Defaults are relative paths under the process working
//! directory."

use std::net::SocketAddr;
use std::path::PathBuf;

/// Resolved server configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub upload_dir: PathBuf,
    pub parsed_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub bind_addr: SocketAddr,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let upload_dir = env_path("TV_UPLOAD_DIR", "./data/uploads");
        let parsed_dir = env_path("TV_PARSED_DIR", "./data/parsed");
        let temp_dir = env_path("TV_TEMP_DIR", "./data/tmp");
        let bind_addr = std::env::var("TV_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_addr: SocketAddr = bind_addr
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid TV_BIND_ADDR {bind_addr:?}: {err}"))?;

        Ok(Self {
            upload_dir,
            parsed_dir,
            temp_dir,
            bind_addr,
        })
    }
}

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_path_falls_back_to_the_relative_default() {
        std::env::remove_var("TV_SETTINGS_TEST_VAR");
        assert_eq!(env_path("TV_SETTINGS_TEST_VAR", "./data/x"), PathBuf::from("./data/x"));
    }
}
