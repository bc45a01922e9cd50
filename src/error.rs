//! Error types for the compaction filter
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using CompactionError
pub type Result<T> = std::result::Result<T, CompactionError>;

/// Unified error type for filter and compaction operations
#[derive(Debug, Error)]
pub enum CompactionError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    /// A key, row value or partition header could not be decoded.
    #[error("Corrupted input: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Metadata Store Errors
    // -------------------------------------------------------------------------
    #[error("Metadata store error: {0}")]
    MetaStore(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for CompactionError {
    fn from(e: bincode::Error) -> Self {
        CompactionError::Serialization(e.to_string())
    }
}
