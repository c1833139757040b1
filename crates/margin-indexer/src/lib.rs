//! Margin Indexer
//!
//! This crate provides the annotation indexing engine for Margin:
//! - Regex-based annotation extraction from arbitrary comment syntaxes
//! - Batch scanning with a bounded first batch and background continuation
//! - Per-file fingerprint caching to skip unchanged files on rescan
//! - An in-memory annotation store with per-file grouping
//! - File watching with debounced incremental repair

mod annotation;
mod error;
pub mod host;
pub mod reactor;
pub mod scanner;
pub mod status;
pub mod store;
pub mod watcher;

pub use annotation::Annotation;
pub use error::IndexerError;
pub use host::{AuthorLookup, FileStat, LocalWorkspace, NoAuthorLookup, Workspace};
pub use reactor::ChangeReactor;
pub use scanner::{
    Extractor, FileIndexCache, LineMap, RawMatch, ScanOptions, Scanner, DEFAULT_BATCH_SIZE,
    DEFAULT_MARKER_PATTERN,
};
pub use status::{ScanState, ScanStatus, StatusPublisher};
pub use store::AnnotationStore;
pub use watcher::{ChangeBatcher, ChangeKind, FileChange, FileWatcher, WatcherOptions};
