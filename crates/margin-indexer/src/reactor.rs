//! Incremental repair on file system changes.
//!
//! The reactor consumes [`FileChange`] events and keeps the scanner's
//! cache and store consistent: changed files lose their fingerprint so
//! the next scan re-extracts them, deleted files are dropped outright,
//! and a change to a file that currently contributes annotations
//! triggers a full rescan. Reactor failures never propagate.

use crate::scanner::Scanner;
use crate::watcher::{ChangeBatcher, ChangeKind, FileChange};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Reacts to file system change events on behalf of a [`Scanner`].
pub struct ChangeReactor {
    scanner: Scanner,
}

impl ChangeReactor {
    /// Create a reactor driving the given scanner.
    pub fn new(scanner: Scanner) -> Self {
        Self { scanner }
    }

    /// Consume change events until the sender side closes. Each burst of
    /// events is coalesced and causes at most one rescan.
    pub async fn run(self, mut rx: mpsc::Receiver<FileChange>) {
        while let Some(change) = rx.recv().await {
            let mut batcher = ChangeBatcher::new();
            batcher.add(change);
            while let Ok(queued) = rx.try_recv() {
                batcher.add(queued);
            }
            self.apply(batcher.take()).await;
        }
        debug!("Change stream closed; reactor stopping");
    }

    /// Apply one coalesced batch of changes.
    pub async fn apply(&self, changes: Vec<FileChange>) {
        let mut needs_rescan = false;

        for change in changes {
            match change.kind {
                ChangeKind::Deleted => {
                    debug!(path = ?change.path, "File deleted; dropping its annotations");
                    self.scanner.on_file_deleted(&change.path);
                }
                ChangeKind::Created | ChangeKind::Modified => {
                    if self.scanner.on_file_changed(&change.path) {
                        needs_rescan = true;
                    }
                }
            }
        }

        if needs_rescan {
            debug!("Changed file contributes annotations; rescanning");
            if let Err(e) = self.scanner.start_scan().await {
                warn!(error = %e, "Rescan after file change failed");
            }
        }
    }
}
