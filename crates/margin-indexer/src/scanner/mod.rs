//! Batch scan scheduling.
//!
//! The scanner enumerates candidate files, processes the first batch
//! inline so callers see results after one batch's worth of work, then
//! continues in a background task, batch by batch. A generation counter
//! makes a new scan supersede any in-flight background batches: stale
//! batches observe the bumped generation and discard their results.

mod cache;
mod extract;

pub use cache::{CacheEntry, FileIndexCache};
pub use extract::{Extractor, LineMap, RawMatch, DEFAULT_MARKER_PATTERN};

use crate::host::{AuthorLookup, Workspace};
use crate::status::{ScanState, ScanStatus, StatusPublisher};
use crate::store::AnnotationStore;
use crate::{Annotation, IndexerError};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Default number of files per batch.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Options for scanning a workspace.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Marker alternation inserted verbatim into the extraction regex
    pub marker_pattern: String,
    /// Include globs, relative to the workspace root
    pub include_globs: Vec<String>,
    /// Exclude globs; bare names match directories anywhere in the tree
    pub exclude_globs: Vec<String>,
    /// Files per batch
    pub batch_size: usize,
    /// Whether to resolve authors per annotation
    pub enable_author_lookup: bool,
    /// Upper bound on one author lookup
    pub author_timeout: Duration,
    /// Log skipped files
    pub debug: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            marker_pattern: DEFAULT_MARKER_PATTERN.to_string(),
            include_globs: vec!["**/*".to_string()],
            exclude_globs: vec![
                "node_modules".to_string(),
                "target".to_string(),
                "dist".to_string(),
                "build".to_string(),
                "vendor".to_string(),
            ],
            batch_size: DEFAULT_BATCH_SIZE,
            enable_author_lookup: false,
            author_timeout: Duration::from_millis(300),
            debug: false,
        }
    }
}

/// Mutable engine state. One lock, never held across an await point, so
/// every multi-step mutation (store append + cache record + progress) is
/// atomic from any reader's point of view.
struct ScanInner {
    store: AnnotationStore,
    cache: FileIndexCache,
    /// Files already handled in the current generation
    processed: HashSet<PathBuf>,
    /// Previous scan's per-file groups, re-appended for cache-skipped
    /// files so unchanged files keep their annotations across rescans
    carry: HashMap<PathBuf, Vec<Arc<Annotation>>>,
    status: ScanStatus,
    generation: u64,
}

impl ScanInner {
    fn new() -> Self {
        Self {
            store: AnnotationStore::new(),
            cache: FileIndexCache::new(),
            processed: HashSet::new(),
            carry: HashMap::new(),
            status: ScanStatus::default(),
            generation: 0,
        }
    }
}

/// The batch scan scheduler.
///
/// Cheap to clone; clones share the same store, cache, and status stream.
#[derive(Clone)]
pub struct Scanner {
    workspace: Arc<dyn Workspace>,
    authors: Arc<dyn AuthorLookup>,
    options: ScanOptions,
    inner: Arc<Mutex<ScanInner>>,
    status_tx: StatusPublisher,
}

impl Scanner {
    /// Create a scanner over the given workspace and author lookup.
    pub fn new(
        workspace: Arc<dyn Workspace>,
        authors: Arc<dyn AuthorLookup>,
        options: ScanOptions,
    ) -> Self {
        Self {
            workspace,
            authors,
            options,
            inner: Arc::new(Mutex::new(ScanInner::new())),
            status_tx: StatusPublisher::new(),
        }
    }

    /// The options this scanner was built with.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Start a scan: enumerate files, process the first batch inline, and
    /// return its annotations. Remaining files continue in a background
    /// task. Any previous in-flight scan is superseded.
    ///
    /// Fails as a whole only on a malformed marker pattern or an
    /// enumeration failure (e.g. missing workspace root).
    pub async fn start_scan(&self) -> Result<Vec<Arc<Annotation>>, IndexerError> {
        // Validate the pattern once, up front: a bad pattern fails the
        // whole scan instead of every file in it.
        let extractor = match Extractor::new(&self.options.marker_pattern) {
            Ok(extractor) => extractor,
            Err(e) => {
                warn!(error = %e, "Scan aborted: marker pattern does not compile");
                self.fail_scan();
                return Err(e);
            }
        };

        let files = match self.enumerate().await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Scan aborted: enumeration failed");
                self.fail_scan();
                return Err(e);
            }
        };

        let (generation, snapshot) = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            let carry = inner.store.drain_groups();
            inner.carry = carry;
            inner.processed.clear();
            inner.status = ScanStatus {
                state: ScanState::Searching,
                files_processed: 0,
                total_files: files.len(),
                current_file: None,
                generation: inner.generation,
            };
            (inner.generation, inner.status.clone())
        };
        self.status_tx.publish(snapshot);

        info!(files = files.len(), generation, "Scan started");

        let batch_size = self.options.batch_size.max(1);
        let first: Vec<PathBuf> = files.iter().take(batch_size).cloned().collect();
        let rest: Vec<PathBuf> = files.into_iter().skip(batch_size).collect();

        let first_batch = self.process_batch(&extractor, generation, &first).await;

        if rest.is_empty() {
            self.finish_scan(generation);
        } else {
            let scanner = self.clone();
            tokio::spawn(async move {
                scanner.run_background(extractor, generation, rest).await;
            });
        }

        Ok(first_batch)
    }

    /// Clear the fingerprint cache, then scan from scratch.
    pub async fn refresh(&self) -> Result<Vec<Arc<Annotation>>, IndexerError> {
        self.inner.lock().cache.clear();
        self.start_scan().await
    }

    /// The slice `[offset, offset + len)` of the accumulated sequence.
    /// Empty when the caller has consumed everything scanned so far.
    pub fn next_batch(&self, offset: usize, len: usize) -> Vec<Arc<Annotation>> {
        self.inner.lock().store.slice(offset, len)
    }

    /// Total annotations discovered so far.
    pub fn total_count(&self) -> usize {
        self.inner.lock().store.total()
    }

    /// Whether a scan is currently running (foreground or background).
    pub fn is_scanning(&self) -> bool {
        self.inner.lock().status.state == ScanState::Searching
    }

    /// Annotations in one file, in source order.
    pub fn annotations_in_file(&self, path: &Path) -> Vec<Arc<Annotation>> {
        self.inner.lock().store.in_file(path)
    }

    /// Number of annotations in one file.
    pub fn annotation_count_in_file(&self, path: &Path) -> usize {
        self.inner.lock().store.count_in_file(path)
    }

    /// Current status snapshot.
    pub fn status(&self) -> ScanStatus {
        self.inner.lock().status.clone()
    }

    /// Subscribe to status updates: at least one per file processed and
    /// one per state transition.
    pub fn subscribe_status(&self) -> broadcast::Receiver<ScanStatus> {
        self.status_tx.subscribe()
    }

    /// Delete an annotation from its file, then rescan so the index
    /// matches the edited file. Returns false and leaves the store
    /// untouched when the edit cannot be applied.
    pub async fn remove_annotation(&self, annotation: &Annotation) -> bool {
        let applied = self
            .workspace
            .apply_deletion(&annotation.file, annotation.span.clone())
            .await;

        if !applied {
            warn!(file = ?annotation.file, line = annotation.line, "Annotation removal failed");
            return false;
        }

        // The file is known to have changed; mtime alone is too coarse to
        // prove it, so drop its fingerprint before rescanning.
        self.on_file_changed(&annotation.file);

        if let Err(e) = self.start_scan().await {
            warn!(error = %e, "Rescan after removal failed");
        }
        true
    }

    /// Drop all state and return to idle. In-flight background batches
    /// observe the bumped generation and discard themselves.
    pub fn dispose(&self) {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.store.clear();
            inner.cache.clear();
            inner.processed.clear();
            inner.carry.clear();
            inner.status = ScanStatus {
                generation: inner.generation,
                ..ScanStatus::default()
            };
            inner.status.clone()
        };
        self.status_tx.publish(snapshot);
    }

    /// A file changed or appeared: drop its fingerprint and processed
    /// mark. Returns true when the file currently contributes annotations
    /// (the caller should rescan to stay consistent).
    pub(crate) fn on_file_changed(&self, path: &Path) -> bool {
        let mut inner = self.inner.lock();
        inner.cache.invalidate(path);
        inner.processed.remove(path);
        inner.store.count_in_file(path) > 0
    }

    /// A file disappeared: drop its fingerprint, processed mark, and every
    /// annotation it contributed.
    pub(crate) fn on_file_deleted(&self, path: &Path) {
        let mut inner = self.inner.lock();
        inner.cache.invalidate(path);
        inner.processed.remove(path);
        inner.carry.remove(path);
        inner.store.invalidate_file(path);
    }

    /// Enumerate candidate files: one listing per include glob, unioned
    /// and de-duplicated, preserving first-seen order.
    async fn enumerate(&self) -> Result<Vec<PathBuf>, IndexerError> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for glob in &self.options.include_globs {
            let listed = self
                .workspace
                .list_files(glob, &self.options.exclude_globs)
                .await?;
            for path in listed {
                if seen.insert(path.clone()) {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    async fn run_background(&self, extractor: Extractor, generation: u64, files: Vec<PathBuf>) {
        let batch_size = self.options.batch_size.max(1);
        for batch in files.chunks(batch_size) {
            if self.is_stale(generation) {
                debug!(generation, "Background scan superseded; discarding");
                return;
            }
            self.process_batch(&extractor, generation, batch).await;
            // Let consumers drain between batches
            tokio::task::yield_now().await;
        }
        self.finish_scan(generation);
    }

    async fn process_batch(
        &self,
        extractor: &Extractor,
        generation: u64,
        files: &[PathBuf],
    ) -> Vec<Arc<Annotation>> {
        let mut appended = Vec::new();
        for path in files {
            match self.process_file(extractor, generation, path).await {
                Some(mut annotations) => appended.append(&mut annotations),
                None => break,
            }
        }
        appended
    }

    /// Process one file. Returns the annotations it contributed, or None
    /// when this scan generation was superseded.
    async fn process_file(
        &self,
        extractor: &Extractor,
        generation: u64,
        path: &Path,
    ) -> Option<Vec<Arc<Annotation>>> {
        // Re-entry guard: a file listed twice in one generation is never
        // re-extracted.
        {
            let inner = self.inner.lock();
            if inner.generation != generation {
                return None;
            }
            if inner.processed.contains(path) {
                return Some(Vec::new());
            }
        }

        let mtime = match self.workspace.stat(path).await {
            Ok(stat) => stat.mtime,
            Err(e) => {
                if self.options.debug {
                    debug!(path = ?path, error = %e, "Stat failed; skipping file");
                }
                return self.finish_file(generation, path, None, Vec::new());
            }
        };

        // Fingerprint fast path: unchanged files keep their previous
        // annotations without re-extraction.
        let carried = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return None;
            }
            if inner.cache.should_skip(path, mtime) {
                Some(inner.carry.remove(path).unwrap_or_default())
            } else {
                None
            }
        };
        if let Some(kept) = carried {
            return self.finish_file(generation, path, None, kept);
        }

        let text = match self.workspace.read_text(path).await {
            Ok(text) => text,
            Err(e) => {
                if self.options.debug {
                    debug!(path = ?path, error = %e, "Read failed; skipping file");
                }
                return self.finish_file(generation, path, None, Vec::new());
            }
        };

        // Second-chance skip: the mtime moved but the bytes did not.
        let hash: [u8; 32] = Sha256::digest(text.as_bytes()).into();
        let carried = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return None;
            }
            if inner.cache.hash_matches(path, &hash) {
                Some(inner.carry.remove(path).unwrap_or_default())
            } else {
                None
            }
        };
        if let Some(kept) = carried {
            return self.finish_file(generation, path, Some((mtime, Some(hash))), kept);
        }

        let line_map = LineMap::new(&text);
        let mut annotations = Vec::new();
        for raw in extractor.extract(&text) {
            let (line, column) = line_map.position(raw.span.start);
            let author = self.resolve_author(path, line).await;
            annotations.push(Arc::new(Annotation {
                kind: raw.kind,
                message: raw.message,
                file: path.to_path_buf(),
                line,
                column,
                span: raw.span,
                author,
            }));
        }

        self.finish_file(generation, path, Some((mtime, Some(hash))), annotations)
    }

    async fn resolve_author(&self, path: &Path, line: u32) -> Option<String> {
        if !self.options.enable_author_lookup {
            return None;
        }
        match tokio::time::timeout(
            self.options.author_timeout,
            self.authors.resolve_author(path, line),
        )
        .await
        {
            Ok(author) => author,
            Err(_) => {
                debug!(path = ?path, line, "Author lookup timed out");
                None
            }
        }
    }

    /// Commit one file's results: append annotations, record the
    /// fingerprint, mark processed, and bump progress, all under one lock
    /// acquisition. Returns None when the generation was superseded.
    fn finish_file(
        &self,
        generation: u64,
        path: &Path,
        record: Option<(u64, Option<[u8; 32]>)>,
        annotations: Vec<Arc<Annotation>>,
    ) -> Option<Vec<Arc<Annotation>>> {
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return None;
            }
            for annotation in &annotations {
                inner.store.append(annotation.clone());
            }
            if let Some((mtime, hash)) = record {
                inner.cache.record(path, mtime, hash);
            }
            inner.processed.insert(path.to_path_buf());
            inner.status.files_processed += 1;
            inner.status.current_file = Some(path.to_path_buf());
            inner.status.clone()
        };
        self.status_tx.publish(snapshot);
        Some(annotations)
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.inner.lock().generation != generation
    }

    fn finish_scan(&self, generation: u64) {
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            // Files that vanished since the previous scan were never
            // re-appended; their leftovers go with the carry.
            inner.carry.clear();
            inner.status.state = ScanState::Complete;
            inner.status.current_file = None;
            inner.status.clone()
        };
        info!(
            generation,
            files = snapshot.files_processed,
            annotations = self.total_count(),
            "Scan complete"
        );
        self.status_tx.publish(snapshot);
    }

    fn fail_scan(&self) {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.status.state = ScanState::Failed;
            inner.status.clone()
        };
        self.status_tx.publish(snapshot);
    }
}
