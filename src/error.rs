//! Error types for StashKV
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StashError
pub type Result<T> = std::result::Result<T, StashError>;

/// Unified error type for StashKV operations
#[derive(Debug, Error)]
pub enum StashError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resource '{}' is already locked", .0.display())]
    ResourceLocked(PathBuf),

    // -------------------------------------------------------------------------
    // Input Validation Errors
    // -------------------------------------------------------------------------
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid time-to-live: {0}")]
    InvalidTtl(String),

    // -------------------------------------------------------------------------
    // Key State Errors
    // -------------------------------------------------------------------------
    #[error("Key '{0}' already present")]
    DuplicateKey(String),

    #[error("Key '{0}' not in datastore")]
    KeyNotFound(String),

    #[error("Key '{0}' time-to-live expired")]
    ExpiredKey(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Capacity exceeded: {required} bytes needed, buffer holds {capacity}")]
    CapacityExceeded { required: usize, capacity: usize },

    #[error("Corrupt store: {0}")]
    CorruptStore(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StashError {
    /// True for errors caused by caller input rather than the store itself
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            StashError::InvalidKey(_) | StashError::InvalidValue(_) | StashError::InvalidTtl(_)
        )
    }
}
