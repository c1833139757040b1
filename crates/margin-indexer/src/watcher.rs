//! File system watcher feeding the change reactor.
//!
//! Wraps a debounced notify watcher and converts its events into
//! [`FileChange`] values. Bursts of events are further coalesced by
//! [`ChangeBatcher`] so one save-all in an editor causes one rescan,
//! not dozens.

use crate::IndexerError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// File change type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// File was created (treated as changed by the reactor)
    Created,
    /// File content was modified
    Modified,
    /// File was deleted
    Deleted,
}

/// A file system change event.
#[derive(Debug, Clone)]
pub struct FileChange {
    /// Path to the changed file
    pub path: PathBuf,
    /// Kind of change
    pub kind: ChangeKind,
}

/// Options for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Debounce duration
    pub debounce_duration: Duration,
    /// Whether to watch recursively
    pub recursive: bool,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
            recursive: true,
        }
    }
}

/// Debounced file system watcher.
///
/// Keep the returned watcher alive for as long as events are wanted;
/// dropping it stops the underlying notify watcher and closes the
/// receiver handed out by [`FileWatcher::start`].
pub struct FileWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    /// Start watching `root` and return the watcher handle plus the
    /// change event receiver.
    pub fn start(
        root: &Path,
        options: WatcherOptions,
    ) -> Result<(Self, mpsc::Receiver<FileChange>), IndexerError> {
        let root = root
            .canonicalize()
            .map_err(|_| IndexerError::NotFound(root.to_path_buf()))?;

        let (tx, rx) = mpsc::channel(1000);

        let mut debouncer = new_debouncer(
            options.debounce_duration,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    for event in events {
                        if let Some(change) = convert_event(&event.event) {
                            if let Err(e) = tx.blocking_send(change) {
                                error!(error = %e, "Failed to send change event");
                            }
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "Watcher error");
                    }
                }
            },
        )
        .map_err(|e| IndexerError::Watcher(e.to_string()))?;

        let mode = if options.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        debouncer
            .watch(&root, mode)
            .map_err(|e: notify::Error| IndexerError::Watcher(e.to_string()))?;

        info!(path = ?root, recursive = options.recursive, "Started watching");

        Ok((Self { _debouncer: debouncer }, rx))
    }
}

/// Convert a notify event to a [`FileChange`].
fn convert_event(event: &Event) -> Option<FileChange> {
    let path = event.paths.first()?.clone();

    // Directories are never indexed
    if path.is_dir() {
        return None;
    }

    let kind = match &event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return None,
    };

    debug!(path = ?path, kind = ?kind, "File change detected");

    Some(FileChange { path, kind })
}

/// Coalesces a burst of file changes: one entry per path, delete wins
/// over create/modify.
#[derive(Debug, Default)]
pub struct ChangeBatcher {
    changes: Vec<FileChange>,
}

impl ChangeBatcher {
    /// Create an empty batcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a change, merging it with any pending change for the same path.
    pub fn add(&mut self, change: FileChange) {
        if let Some(existing) = self.changes.iter_mut().find(|c| c.path == change.path) {
            if change.kind == ChangeKind::Deleted {
                existing.kind = ChangeKind::Deleted;
            } else if existing.kind != ChangeKind::Deleted {
                existing.kind = change.kind;
            }
        } else {
            self.changes.push(change);
        }
    }

    /// Take the coalesced batch, leaving the batcher empty.
    pub fn take(&mut self) -> Vec<FileChange> {
        std::mem::take(&mut self.changes)
    }

    /// Number of pending changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_watcher_start() {
        let temp_dir = tempdir().unwrap();
        let result = FileWatcher::start(temp_dir.path(), WatcherOptions::default());
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_watcher_missing_root() {
        let result = FileWatcher::start(
            Path::new("/definitely/not/a/real/root"),
            WatcherOptions::default(),
        );
        assert!(matches!(result, Err(IndexerError::NotFound(_))));
    }

    #[test]
    fn test_change_batcher_deduplicates() {
        let mut batcher = ChangeBatcher::new();

        batcher.add(FileChange {
            path: PathBuf::from("test.rs"),
            kind: ChangeKind::Modified,
        });
        batcher.add(FileChange {
            path: PathBuf::from("test.rs"),
            kind: ChangeKind::Modified,
        });

        assert_eq!(batcher.len(), 1);
    }

    #[test]
    fn test_change_batcher_delete_wins() {
        let mut batcher = ChangeBatcher::new();

        batcher.add(FileChange {
            path: PathBuf::from("test.rs"),
            kind: ChangeKind::Modified,
        });
        batcher.add(FileChange {
            path: PathBuf::from("test.rs"),
            kind: ChangeKind::Deleted,
        });
        batcher.add(FileChange {
            path: PathBuf::from("test.rs"),
            kind: ChangeKind::Created,
        });

        let batch = batcher.take();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind, ChangeKind::Deleted);
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_change_batcher_keeps_distinct_paths() {
        let mut batcher = ChangeBatcher::new();

        batcher.add(FileChange {
            path: PathBuf::from("a.rs"),
            kind: ChangeKind::Created,
        });
        batcher.add(FileChange {
            path: PathBuf::from("b.rs"),
            kind: ChangeKind::Modified,
        });

        assert_eq!(batcher.take().len(), 2);
    }

    #[test]
    fn test_convert_event_create() {
        let event = Event {
            kind: EventKind::Create(notify::event::CreateKind::File),
            paths: vec![PathBuf::from("test.rs")],
            attrs: Default::default(),
        };

        let change = convert_event(&event);
        assert_eq!(change.unwrap().kind, ChangeKind::Created);
    }

    #[test]
    fn test_convert_event_delete() {
        let event = Event {
            kind: EventKind::Remove(notify::event::RemoveKind::File),
            paths: vec![PathBuf::from("test.rs")],
            attrs: Default::default(),
        };

        let change = convert_event(&event);
        assert_eq!(change.unwrap().kind, ChangeKind::Deleted);
    }

    #[test]
    fn test_convert_event_access_ignored() {
        let event = Event {
            kind: EventKind::Access(notify::event::AccessKind::Read),
            paths: vec![PathBuf::from("test.rs")],
            attrs: Default::default(),
        };

        assert!(convert_event(&event).is_none());
    }
}
