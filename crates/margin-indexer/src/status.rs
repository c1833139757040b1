//! Scan status reporting.
//!
//! Progress is published over a broadcast channel: at least one update per
//! file processed and one per state transition. Subscribers receive
//! snapshots; dropping the receiver unsubscribes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Lifecycle state of the current scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    /// No scan has run yet (or the engine was disposed)
    Idle,
    /// A scan is in progress, possibly in the background
    Searching,
    /// The last scan finished
    Complete,
    /// The last scan aborted (enumeration failure, bad pattern)
    Failed,
}

impl Default for ScanState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Snapshot of scan progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStatus {
    /// Current lifecycle state
    pub state: ScanState,
    /// Files processed so far in this scan
    pub files_processed: usize,
    /// Total files enumerated for this scan
    pub total_files: usize,
    /// Last file touched, if any
    pub current_file: Option<PathBuf>,
    /// Scan generation this snapshot belongs to
    pub generation: u64,
}

/// Broadcast publisher for scan status snapshots.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    tx: broadcast::Sender<ScanStatus>,
}

impl StatusPublisher {
    /// Channel capacity. Slow subscribers lose the oldest snapshots, which
    /// is fine: only the latest one matters.
    const CAPACITY: usize = 256;

    /// Create a publisher with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(Self::CAPACITY);
        Self { tx }
    }

    /// Subscribe to status updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanStatus> {
        self.tx.subscribe()
    }

    /// Publish a snapshot. A send with no subscribers is not an error.
    pub fn publish(&self, status: ScanStatus) {
        let _ = self.tx.send(status);
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}
