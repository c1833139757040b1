//! The index service.
//!
//! An explicitly constructed handle owning the scan engine, the file
//! watcher, and the change reactor task. The application creates one per
//! workspace session, hands it to the presentation layer, and disposes it
//! on shutdown; there is no hidden global state.

use crate::{Config, CoreError};
use margin_indexer::{
    Annotation, AuthorLookup, ChangeReactor, FileWatcher, LocalWorkspace, NoAuthorLookup,
    ScanStatus, Scanner, WatcherOptions, Workspace,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// One workspace session's annotation index.
pub struct IndexService {
    config: Config,
    scanner: Scanner,
    watcher: Mutex<Option<FileWatcher>>,
    reactor_task: Mutex<Option<JoinHandle<()>>>,
}

impl IndexService {
    /// Create a service over the given collaborators.
    pub fn new(
        config: Config,
        workspace: Arc<dyn Workspace>,
        authors: Arc<dyn AuthorLookup>,
    ) -> Self {
        let scanner = Scanner::new(workspace, authors, config.scan_options());
        Self {
            config,
            scanner,
            watcher: Mutex::new(None),
            reactor_task: Mutex::new(None),
        }
    }

    /// Create a service over the local filesystem with attribution
    /// disabled. Fails when `root` is not a directory.
    pub fn open(config: Config, root: &Path) -> Result<Self, CoreError> {
        let workspace = Arc::new(LocalWorkspace::new(root)?);
        Ok(Self::new(config, workspace, Arc::new(NoAuthorLookup)))
    }

    /// The configuration this service was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the initial scan: returns the first batch of annotations and
    /// leaves the rest streaming in the background.
    pub async fn initialize_scan(&self) -> Result<Vec<Arc<Annotation>>, CoreError> {
        Ok(self.scanner.start_scan().await?)
    }

    /// The next slice of already-discovered annotations, one configured
    /// batch long. Empty once the consumer has caught up.
    pub fn next_batch(&self, offset: usize) -> Vec<Arc<Annotation>> {
        self.scanner.next_batch(offset, self.config.batch_size)
    }

    /// Total annotations discovered so far.
    pub fn total_count(&self) -> usize {
        self.scanner.total_count()
    }

    /// Whether a scan is still running.
    pub fn is_scan_in_progress(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Annotations in one file, in source order.
    pub fn annotations_in_file(&self, path: &Path) -> Vec<Arc<Annotation>> {
        self.scanner.annotations_in_file(path)
    }

    /// Number of annotations in one file.
    pub fn annotation_count_in_file(&self, path: &Path) -> usize {
        self.scanner.annotation_count_in_file(path)
    }

    /// Current status snapshot.
    pub fn status(&self) -> ScanStatus {
        self.scanner.status()
    }

    /// Subscribe to scan status updates. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<ScanStatus> {
        self.scanner.subscribe_status()
    }

    /// Delete an annotation from its file and rescan. Returns false when
    /// the edit cannot be applied; the index is left unchanged then.
    pub async fn remove_annotation(&self, annotation: &Annotation) -> bool {
        self.scanner.remove_annotation(annotation).await
    }

    /// Drop all fingerprints and scan from scratch.
    pub async fn refresh(&self) -> Result<Vec<Arc<Annotation>>, CoreError> {
        Ok(self.scanner.refresh().await?)
    }

    /// Watch `root` for changes and repair the index incrementally. A
    /// second call replaces the previous watcher.
    pub fn watch(&self, root: &Path) -> Result<(), CoreError> {
        let options = WatcherOptions {
            debounce_duration: self.config.debounce_duration(),
            recursive: true,
        };
        let (watcher, rx) = FileWatcher::start(root, options)?;

        let reactor = ChangeReactor::new(self.scanner.clone());
        let task = tokio::spawn(reactor.run(rx));

        if let Some(old) = self.reactor_task.lock().replace(task) {
            old.abort();
        }
        *self.watcher.lock() = Some(watcher);

        Ok(())
    }

    /// Stop watching, abandon any in-flight scan, and clear all state.
    pub fn shutdown(&self) {
        if let Some(task) = self.reactor_task.lock().take() {
            task.abort();
        }
        self.watcher.lock().take();
        self.scanner.dispose();
        info!("Index service shut down");
    }
}

impl Drop for IndexService {
    fn drop(&mut self) {
        if let Some(task) = self.reactor_task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_rejects_missing_root() {
        let result = IndexService::open(Config::default(), Path::new("/no/such/workspace"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_scan_and_query() {
        let temp_dir = tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("a.rs"),
            "// TODO: first\n// FIXME: second\n",
        )
        .unwrap();

        let service = IndexService::open(Config::default(), temp_dir.path()).unwrap();
        let first = service.initialize_scan().await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(service.total_count(), 2);
        assert!(!service.is_scan_in_progress());

        let file = temp_dir.path().join("a.rs").canonicalize().unwrap();
        assert_eq!(service.annotation_count_in_file(&file), 2);
        assert_eq!(service.annotations_in_file(&file)[0].kind, "TODO");
    }

    #[tokio::test]
    async fn test_shutdown_clears_state() {
        let temp_dir = tempdir().unwrap();
        std::fs::write(temp_dir.path().join("a.rs"), "// TODO: x\n").unwrap();

        let service = IndexService::open(Config::default(), temp_dir.path()).unwrap();
        service.initialize_scan().await.unwrap();
        assert_eq!(service.total_count(), 1);

        service.shutdown();
        assert_eq!(service.total_count(), 0);
        assert!(!service.is_scan_in_progress());
    }

    #[tokio::test]
    async fn test_watch_starts_and_replaces() {
        let temp_dir = tempdir().unwrap();
        let service = IndexService::open(Config::default(), temp_dir.path()).unwrap();

        service.watch(temp_dir.path()).unwrap();
        service.watch(temp_dir.path()).unwrap();

        service.shutdown();
    }
}
