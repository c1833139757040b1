//! Host environment collaborators.
//!
//! The engine consumes its environment through two seams: [`Workspace`]
//! (file enumeration, reads, stats, edits) and [`AuthorLookup`] (optional
//! per-annotation attribution). [`LocalWorkspace`] is the production
//! implementation over the local filesystem; tests substitute their own.

use crate::IndexerError;
use async_trait::async_trait;
use ignore::WalkBuilder;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// File metadata the engine cares about.
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    /// Modification time, Unix seconds
    pub mtime: u64,
}

/// The host workspace: enumerates, reads, stats, and edits files.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// List files matching one include glob, minus the exclude globs.
    /// Paths are absolute and the order is stable across calls.
    async fn list_files(
        &self,
        include: &str,
        exclude: &[String],
    ) -> Result<Vec<PathBuf>, IndexerError>;

    /// Read a file as UTF-8 text.
    async fn read_text(&self, path: &Path) -> Result<String, IndexerError>;

    /// Stat a file.
    async fn stat(&self, path: &Path) -> Result<FileStat, IndexerError>;

    /// Delete the byte range `span` from `path`, saving the file. Returns
    /// false when the edit cannot be applied (read-only, moved, bad span);
    /// the file is left untouched in that case.
    async fn apply_deletion(&self, path: &Path, span: Range<usize>) -> bool;
}

/// Optional per-annotation author attribution (e.g. a blame lookup).
/// Implementations may be slow or fail; the engine bounds the wait and
/// treats any failure as "no author".
#[async_trait]
pub trait AuthorLookup: Send + Sync {
    /// Resolve the author of the given line, if known.
    async fn resolve_author(&self, path: &Path, line: u32) -> Option<String>;
}

/// Attribution disabled: every lookup resolves to no author.
pub struct NoAuthorLookup;

#[async_trait]
impl AuthorLookup for NoAuthorLookup {
    async fn resolve_author(&self, _path: &Path, _line: u32) -> Option<String> {
        None
    }
}

/// Local-filesystem workspace rooted at one directory.
///
/// Enumeration walks the tree respecting gitignore rules, filters with the
/// include/exclude globs relative to the root, and returns a sorted list
/// for deterministic scan order.
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    /// Create a workspace rooted at `root`. Fails fast when the root is
    /// missing or not a directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, IndexerError> {
        let root: PathBuf = root.into();
        let root = root
            .canonicalize()
            .map_err(|_| IndexerError::NoWorkspaceRoot(root.clone()))?;
        if !root.is_dir() {
            return Err(IndexerError::NoWorkspaceRoot(root));
        }
        Ok(Self { root })
    }

    /// The workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build the exclude matcher. Bare names like `node_modules` are
    /// expanded to match the directory anywhere in the tree; invalid
    /// patterns are skipped rather than failing the scan.
    fn exclude_set(exclude: &[String]) -> Result<globset::GlobSet, IndexerError> {
        let mut builder = globset::GlobSetBuilder::new();
        for pattern in exclude {
            let expanded = if pattern.contains('*') || pattern.contains('?') {
                pattern.clone()
            } else {
                format!("**/{}", pattern)
            };
            if let Ok(g) = globset::Glob::new(&expanded) {
                builder.add(g);
            }
            if let Ok(g) = globset::Glob::new(&format!("**/{}/**", pattern)) {
                builder.add(g);
            }
        }
        builder
            .build()
            .map_err(|e| IndexerError::Glob(e.to_string()))
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn list_files(
        &self,
        include: &str,
        exclude: &[String],
    ) -> Result<Vec<PathBuf>, IndexerError> {
        if !self.root.is_dir() {
            return Err(IndexerError::NoWorkspaceRoot(self.root.clone()));
        }

        let mut include_builder = globset::GlobSetBuilder::new();
        include_builder
            .add(globset::Glob::new(include).map_err(|e| IndexerError::Glob(e.to_string()))?);
        let include_set = include_builder
            .build()
            .map_err(|e| IndexerError::Glob(e.to_string()))?;

        let exclude_set = Self::exclude_set(exclude)?;

        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .parents(true)
            .build();

        let mut files = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(e) => e,
                Err(e) => {
                    debug!(error = %e, "Walk error");
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);

            if exclude_set.is_match(relative) {
                continue;
            }
            if include_set.is_match(relative) {
                files.push(path.to_path_buf());
            }
        }

        // Sort for deterministic scan order
        files.sort();

        Ok(files)
    }

    async fn read_text(&self, path: &Path) -> Result<String, IndexerError> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn stat(&self, path: &Path) -> Result<FileStat, IndexerError> {
        let metadata = tokio::fs::metadata(path).await?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(FileStat { mtime })
    }

    async fn apply_deletion(&self, path: &Path, span: Range<usize>) -> bool {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(t) => t,
            Err(e) => {
                warn!(path = ?path, error = %e, "Deletion failed: cannot read file");
                return false;
            }
        };

        if span.start > span.end
            || span.end > text.len()
            || !text.is_char_boundary(span.start)
            || !text.is_char_boundary(span.end)
        {
            warn!(path = ?path, ?span, "Deletion failed: stale byte range");
            return false;
        }

        // Widen to the whole line when the deletion would leave it blank
        let line_start = text[..span.start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = text[span.end..]
            .find('\n')
            .map(|i| span.end + i + 1)
            .unwrap_or(text.len());
        let rest_of_line_blank = text[line_start..span.start].trim().is_empty()
            && text[span.end..line_end].trim().is_empty();
        let (cut_start, cut_end) = if rest_of_line_blank {
            (line_start, line_end)
        } else {
            (span.start, span.end)
        };

        let mut edited = String::with_capacity(text.len());
        edited.push_str(&text[..cut_start]);
        edited.push_str(&text[cut_end..]);

        match tokio::fs::write(path, edited).await {
            Ok(()) => true,
            Err(e) => {
                warn!(path = ?path, error = %e, "Deletion failed: cannot write file");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_new_rejects_missing_root() {
        let result = LocalWorkspace::new("/definitely/not/a/real/root");
        assert!(matches!(result, Err(IndexerError::NoWorkspaceRoot(_))));
    }

    #[tokio::test]
    async fn test_list_files_matches_include_glob() {
        let temp_dir = tempdir().unwrap();
        std::fs::write(temp_dir.path().join("main.rs"), "fn main() {}").unwrap();
        std::fs::write(temp_dir.path().join("notes.md"), "# notes").unwrap();

        let workspace = LocalWorkspace::new(temp_dir.path()).unwrap();
        let files = workspace.list_files("**/*.rs", &[]).await.unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("main.rs"));
    }

    #[tokio::test]
    async fn test_list_files_is_sorted() {
        let temp_dir = tempdir().unwrap();
        for name in ["c.rs", "a.rs", "b.rs"] {
            std::fs::write(temp_dir.path().join(name), "").unwrap();
        }

        let workspace = LocalWorkspace::new(temp_dir.path()).unwrap();
        let files = workspace.list_files("**/*.rs", &[]).await.unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.rs", "b.rs", "c.rs"]);
    }

    #[tokio::test]
    async fn test_list_files_excludes_directories_by_name() {
        let temp_dir = tempdir().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(temp_dir.path().join("node_modules/pkg/index.js"), "").unwrap();
        std::fs::write(temp_dir.path().join("app.js"), "").unwrap();

        let workspace = LocalWorkspace::new(temp_dir.path()).unwrap();
        let files = workspace
            .list_files("**/*.js", &["node_modules".to_string()])
            .await
            .unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("app.js"));
    }

    #[tokio::test]
    async fn test_list_files_respects_gitignore() {
        let temp_dir = tempdir().unwrap();
        std::fs::create_dir(temp_dir.path().join(".git")).unwrap();
        std::fs::write(temp_dir.path().join(".gitignore"), "build/\n").unwrap();
        std::fs::create_dir(temp_dir.path().join("build")).unwrap();
        std::fs::write(temp_dir.path().join("build/out.rs"), "").unwrap();
        std::fs::write(temp_dir.path().join("kept.rs"), "").unwrap();

        let workspace = LocalWorkspace::new(temp_dir.path()).unwrap();
        let files = workspace.list_files("**/*.rs", &[]).await.unwrap();

        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert!(names.contains(&"kept.rs"));
        assert!(!names.contains(&"out.rs"));
    }

    #[tokio::test]
    async fn test_list_files_invalid_include_glob() {
        let temp_dir = tempdir().unwrap();
        let workspace = LocalWorkspace::new(temp_dir.path()).unwrap();

        let result = workspace.list_files("[invalid", &[]).await;
        assert!(matches!(result, Err(IndexerError::Glob(_))));
    }

    #[tokio::test]
    async fn test_read_text_and_stat() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();

        let workspace = LocalWorkspace::new(temp_dir.path()).unwrap();

        assert_eq!(workspace.read_text(&file).await.unwrap(), "hello");
        assert!(workspace.stat(&file).await.unwrap().mtime > 0);
    }

    #[tokio::test]
    async fn test_apply_deletion_removes_whole_line() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("a.rs");
        let text = "fn main() {}\n// TODO: fix this\nlet x = 1;\n";
        std::fs::write(&file, text).unwrap();

        let start = text.find("// TODO").unwrap();
        let end = start + "// TODO: fix this".len();

        let workspace = LocalWorkspace::new(temp_dir.path()).unwrap();
        assert!(workspace.apply_deletion(&file, start..end).await);

        let edited = std::fs::read_to_string(&file).unwrap();
        assert_eq!(edited, "fn main() {}\nlet x = 1;\n");
    }

    #[tokio::test]
    async fn test_apply_deletion_keeps_code_on_shared_line() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("a.rs");
        let text = "let x = 1; // TODO: fix this\n";
        std::fs::write(&file, text).unwrap();

        let start = text.find("// TODO").unwrap();
        let end = start + "// TODO: fix this".len();

        let workspace = LocalWorkspace::new(temp_dir.path()).unwrap();
        assert!(workspace.apply_deletion(&file, start..end).await);

        let edited = std::fs::read_to_string(&file).unwrap();
        assert_eq!(edited, "let x = 1; \n");
    }

    #[tokio::test]
    async fn test_apply_deletion_stale_span_fails() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("a.rs");
        std::fs::write(&file, "short").unwrap();

        let workspace = LocalWorkspace::new(temp_dir.path()).unwrap();
        assert!(!workspace.apply_deletion(&file, 0..100).await);

        // untouched
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "short");
    }

    #[tokio::test]
    async fn test_apply_deletion_missing_file_fails() {
        let temp_dir = tempdir().unwrap();
        let workspace = LocalWorkspace::new(temp_dir.path()).unwrap();

        assert!(
            !workspace
                .apply_deletion(&temp_dir.path().join("gone.rs"), 0..1)
                .await
        );
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_apply_deletion_read_only_file_fails() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("a.rs");
        std::fs::write(&file, "// TODO: fix this\n").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o444)).unwrap();

        // Root is not subject to permission bits; nothing to test there
        if std::fs::OpenOptions::new().write(true).open(&file).is_ok() {
            return;
        }

        let workspace = LocalWorkspace::new(temp_dir.path()).unwrap();
        assert!(!workspace.apply_deletion(&file, 0..17).await);

        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "// TODO: fix this\n"
        );
    }

    #[tokio::test]
    async fn test_no_author_lookup_resolves_none() {
        let lookup = NoAuthorLookup;
        assert!(lookup.resolve_author(Path::new("a.rs"), 0).await.is_none());
    }
}
