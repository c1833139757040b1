//! Core error types for Margin.

use thiserror::Error;

/// Errors that can occur in core operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(String),

    /// Indexing error
    #[error(transparent)]
    Index(#[from] margin_indexer::IndexerError),
}
