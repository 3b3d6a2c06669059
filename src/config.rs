//! Configuration for StashKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StashError};

/// Smallest persisted document: the empty object `{}`
pub const EMPTY_DOCUMENT: &[u8] = b"{}";

/// Main configuration for a StashKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Constraint Configuration
    // -------------------------------------------------------------------------
    /// Max key length, in characters
    pub max_key_len: usize,

    /// Max serialized value size, in bytes
    pub max_value_size: usize,

    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Fixed capacity of the mapped buffer and its backing file (in bytes)
    pub max_local_storage_size: usize,

    /// Directory holding store files
    /// Internal structure:
    ///   {storage_dir}/
    ///     └── LOCAL_STORAGE_<epoch_ms>   (one file per store)
    pub storage_dir: PathBuf,

    /// Sync strategy: whether flushes force mapped pages to disk
    pub sync_strategy: SyncStrategy,
}

/// Durability strategy for flushes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Leave write-back of mapped pages to the OS (eventual durability)
    OsManaged,

    /// msync after every flush (safest, slowest)
    EveryFlush,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_key_len: 32,
            max_value_size: 16 * 1024,               // 16 KB
            max_local_storage_size: 16 * 1024 * 1024, // 16 MB
            storage_dir: PathBuf::from("./stashkv_data"),
            sync_strategy: SyncStrategy::OsManaged,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject limits the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_key_len == 0 {
            return Err(StashError::Config("max_key_len must be > 0".to_string()));
        }
        if self.max_value_size == 0 {
            return Err(StashError::Config("max_value_size must be > 0".to_string()));
        }
        if self.max_local_storage_size < EMPTY_DOCUMENT.len() {
            return Err(StashError::Config(format!(
                "max_local_storage_size must be at least {} bytes",
                EMPTY_DOCUMENT.len()
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the maximum key length (in characters)
    pub fn max_key_len(mut self, len: usize) -> Self {
        self.config.max_key_len = len;
        self
    }

    /// Set the maximum serialized value size (in bytes)
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.config.max_value_size = size;
        self
    }

    /// Set the buffer/file capacity (in bytes)
    pub fn max_local_storage_size(mut self, size: usize) -> Self {
        self.config.max_local_storage_size = size;
        self
    }

    /// Set the directory store files are created in
    pub fn storage_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = path.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
