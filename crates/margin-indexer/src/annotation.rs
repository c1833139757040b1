//! The annotation data type.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// One discovered annotation comment (TODO, FIXME, ...) with its location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    /// Normalized marker label (uppercased, trimmed), e.g. "TODO"
    pub kind: String,

    /// Free text captured after the marker
    pub message: String,

    /// Absolute path of the file the annotation lives in
    pub file: PathBuf,

    /// Line of the match start (0-based)
    pub line: u32,

    /// Byte column of the match start within its line (0-based)
    pub column: u32,

    /// Byte range covering the full matched comment annotation
    pub span: Range<usize>,

    /// Attribution, when an author lookup is configured and succeeded
    pub author: Option<String>,
}

impl Annotation {
    /// Two annotations are the same logical entity when they sit at the
    /// same file, line, and column. Used to re-find an annotation after
    /// the underlying list has been rebuilt by a rescan.
    pub fn same_site(&self, other: &Annotation) -> bool {
        self.line == other.line && self.column == other.column && self.file == other.file
    }

    /// Check whether this annotation belongs to the given file.
    pub fn in_file(&self, path: &Path) -> bool {
        self.file == path
    }
}

impl std::fmt::Display for Annotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{} [{}] {}",
            self.file.display(),
            self.line + 1,
            self.column + 1,
            self.kind,
            self.message
        )
    }
}
