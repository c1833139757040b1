//! In-memory annotation store.
//!
//! The authoritative collection of discovered annotations: a flat sequence
//! in discovery order plus a per-file grouping for fast lookup. Every
//! mutation updates both views inside one call, so no reader can observe
//! one view without the other.

use crate::Annotation;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The authoritative in-memory collection of discovered annotations.
#[derive(Debug, Default)]
pub struct AnnotationStore {
    /// All annotations, in discovery order
    annotations: Vec<Arc<Annotation>>,
    /// Grouping by file, same order within each file
    by_file: HashMap<PathBuf, Vec<Arc<Annotation>>>,
}

impl AnnotationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one annotation to the flat sequence and its file's group.
    pub fn append(&mut self, annotation: Arc<Annotation>) {
        self.by_file
            .entry(annotation.file.clone())
            .or_default()
            .push(annotation.clone());
        self.annotations.push(annotation);
    }

    /// Remove every annotation matching `predicate` from both views.
    pub fn remove_where(&mut self, predicate: impl Fn(&Annotation) -> bool) {
        self.annotations.retain(|a| !predicate(a));
        for group in self.by_file.values_mut() {
            group.retain(|a| !predicate(a));
        }
        self.by_file.retain(|_, group| !group.is_empty());
    }

    /// Drop every annotation for `path` from both views.
    pub fn invalidate_file(&mut self, path: &Path) {
        if self.by_file.remove(path).is_none() {
            return;
        }
        self.annotations.retain(|a| a.file != path);
    }

    /// Annotations for one file, in discovery order.
    pub fn in_file(&self, path: &Path) -> Vec<Arc<Annotation>> {
        self.by_file.get(path).cloned().unwrap_or_default()
    }

    /// Number of annotations in one file.
    pub fn count_in_file(&self, path: &Path) -> usize {
        self.by_file.get(path).map(|g| g.len()).unwrap_or(0)
    }

    /// Total number of annotations.
    pub fn total(&self) -> usize {
        self.annotations.len()
    }

    /// The slice `[offset, offset + len)` of the flat sequence. Empty when
    /// `offset` is at or past the end.
    pub fn slice(&self, offset: usize, len: usize) -> Vec<Arc<Annotation>> {
        if offset >= self.annotations.len() {
            return Vec::new();
        }
        let end = (offset + len).min(self.annotations.len());
        self.annotations[offset..end].to_vec()
    }

    /// Files that currently contribute annotations.
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.by_file.keys()
    }

    /// Empty the store and hand back the per-file grouping, so a rescan
    /// can re-seed unchanged files without re-extraction.
    pub fn drain_groups(&mut self) -> HashMap<PathBuf, Vec<Arc<Annotation>>> {
        self.annotations.clear();
        std::mem::take(&mut self.by_file)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.annotations.clear();
        self.by_file.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(file: &str, line: u32) -> Arc<Annotation> {
        Arc::new(Annotation {
            kind: "TODO".to_string(),
            message: format!("item at line {line}"),
            file: PathBuf::from(file),
            line,
            column: 0,
            span: 0..10,
            author: None,
        })
    }

    /// The flat count always equals the sum of per-file counts.
    fn assert_views_consistent(store: &AnnotationStore) {
        let per_file_total: usize = store
            .files()
            .map(|f| store.count_in_file(f))
            .sum();
        assert_eq!(store.total(), per_file_total);
    }

    #[test]
    fn test_append_updates_both_views() {
        let mut store = AnnotationStore::new();
        store.append(annotation("a.rs", 0));
        store.append(annotation("a.rs", 5));
        store.append(annotation("b.rs", 1));

        assert_eq!(store.total(), 3);
        assert_eq!(store.count_in_file(Path::new("a.rs")), 2);
        assert_eq!(store.count_in_file(Path::new("b.rs")), 1);
        assert_views_consistent(&store);
    }

    #[test]
    fn test_in_file_preserves_order() {
        let mut store = AnnotationStore::new();
        store.append(annotation("a.rs", 3));
        store.append(annotation("b.rs", 0));
        store.append(annotation("a.rs", 7));

        let in_a = store.in_file(Path::new("a.rs"));
        assert_eq!(in_a.len(), 2);
        assert_eq!(in_a[0].line, 3);
        assert_eq!(in_a[1].line, 7);
    }

    #[test]
    fn test_invalidate_file_removes_from_both_views() {
        let mut store = AnnotationStore::new();
        store.append(annotation("a.rs", 0));
        store.append(annotation("a.rs", 1));
        store.append(annotation("a.rs", 2));
        store.append(annotation("b.rs", 0));

        store.invalidate_file(Path::new("a.rs"));

        assert_eq!(store.total(), 1);
        assert_eq!(store.count_in_file(Path::new("a.rs")), 0);
        assert!(store.in_file(Path::new("a.rs")).is_empty());
        assert_views_consistent(&store);
    }

    #[test]
    fn test_invalidate_unknown_file_is_noop() {
        let mut store = AnnotationStore::new();
        store.append(annotation("a.rs", 0));

        store.invalidate_file(Path::new("missing.rs"));

        assert_eq!(store.total(), 1);
        assert_views_consistent(&store);
    }

    #[test]
    fn test_remove_where() {
        let mut store = AnnotationStore::new();
        store.append(annotation("a.rs", 0));
        store.append(annotation("a.rs", 1));
        store.append(annotation("b.rs", 0));

        store.remove_where(|a| a.line == 0);

        assert_eq!(store.total(), 1);
        assert_eq!(store.count_in_file(Path::new("a.rs")), 1);
        assert_eq!(store.count_in_file(Path::new("b.rs")), 0);
        assert_views_consistent(&store);
    }

    #[test]
    fn test_slice_pagination_reconstructs_sequence() {
        let mut store = AnnotationStore::new();
        for i in 0..7 {
            store.append(annotation("a.rs", i));
        }

        let mut collected = Vec::new();
        let mut offset = 0;
        loop {
            let page = store.slice(offset, 3);
            if page.is_empty() {
                break;
            }
            offset += page.len();
            collected.extend(page);
        }

        assert_eq!(collected.len(), 7);
        for (i, a) in collected.iter().enumerate() {
            assert_eq!(a.line, i as u32);
        }
    }

    #[test]
    fn test_slice_past_end_is_empty() {
        let mut store = AnnotationStore::new();
        store.append(annotation("a.rs", 0));

        assert!(store.slice(1, 10).is_empty());
        assert!(store.slice(100, 10).is_empty());
    }

    #[test]
    fn test_drain_groups_empties_store() {
        let mut store = AnnotationStore::new();
        store.append(annotation("a.rs", 0));
        store.append(annotation("b.rs", 1));

        let groups = store.drain_groups();

        assert_eq!(store.total(), 0);
        assert_eq!(store.files().count(), 0);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[Path::new("a.rs")].len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut store = AnnotationStore::new();
        store.append(annotation("a.rs", 0));

        store.clear();

        assert_eq!(store.total(), 0);
        assert_eq!(store.files().count(), 0);
    }
}
