//! Client configuration file parsing (.shardsync.toml)

use std::path::Path;

use crate::error::{CoreError, Result};

/// Default chunk size in bytes when neither flag nor config sets one.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Default per-call RPC timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Config file name, looked up inside the sync directory.
pub const CONFIG_FILE: &str = ".shardsync.toml";

/// Optional per-directory sync settings. CLI flags take precedence.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Chunk size in bytes
    pub block_size: Option<u32>,
    /// Per-call RPC timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

impl SyncConfig {
    /// Load config from the sync directory.
    ///
    /// Returns default config if `.shardsync.toml` doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&config_path)?;
        toml::from_str(&content).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Effective block size: flag, then config, then default
    #[must_use]
    pub fn block_size(&self, flag: Option<u32>) -> u32 {
        flag.or(self.block_size).unwrap_or(DEFAULT_BLOCK_SIZE)
    }

    /// Effective RPC timeout in milliseconds: flag, then config, then default
    #[must_use]
    pub fn timeout_ms(&self, flag: Option<u64>) -> u64 {
        flag.or(self.timeout_ms).unwrap_or(DEFAULT_TIMEOUT_MS)
    }
}
