//! Per-file fingerprint cache for skipping unchanged files on rescan.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Cached evidence that a file was already scanned.
///
/// An entry is valid only while its stored mtime still equals the file's
/// current mtime; any mismatch forces re-extraction.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Modification time at scan, Unix seconds
    pub mtime: u64,
    /// SHA-256 of the content at scan, when it was read
    pub content_hash: Option<[u8; 32]>,
    /// When this entry was last written
    pub last_checked: DateTime<Utc>,
}

/// Tracks per-file modification fingerprints.
#[derive(Debug, Default)]
pub struct FileIndexCache {
    entries: HashMap<PathBuf, CacheEntry>,
}

impl FileIndexCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// True only if an entry exists for `path` and its stored mtime equals
    /// `mtime` exactly. Read-only: repeated calls never change state.
    pub fn should_skip(&self, path: &Path, mtime: u64) -> bool {
        self.entries
            .get(path)
            .map(|entry| entry.mtime == mtime)
            .unwrap_or(false)
    }

    /// True when the stored content hash for `path` equals `hash`. Used as
    /// a second-chance skip when the mtime moved but the bytes did not.
    pub fn hash_matches(&self, path: &Path, hash: &[u8; 32]) -> bool {
        self.entries
            .get(path)
            .and_then(|entry| entry.content_hash.as_ref())
            .map(|stored| stored == hash)
            .unwrap_or(false)
    }

    /// Record the fingerprint for a freshly scanned file.
    pub fn record(&mut self, path: &Path, mtime: u64, content_hash: Option<[u8; 32]>) {
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                mtime,
                content_hash,
                last_checked: Utc::now(),
            },
        );
    }

    /// Drop the entry for `path` unconditionally. Idempotent.
    pub fn invalidate(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
