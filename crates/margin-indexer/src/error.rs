//! Indexer error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during scanning and indexing operations.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured marker pattern does not compile
    #[error("Invalid marker pattern: {message}")]
    Pattern { message: String },

    /// Invalid include/exclude glob
    #[error("Glob pattern error: {0}")]
    Glob(String),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// The workspace has no usable root directory
    #[error("Workspace root not found: {0}")]
    NoWorkspaceRoot(PathBuf),

    /// Path not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),
}
