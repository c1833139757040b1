//! Annotation extraction from raw file text.
//!
//! A single configurable regex recognizes a marker (TODO, FIXME, ...)
//! preceded by a comment-opening token and captures the trailing message.
//! The extractor works on byte offsets only; callers convert offsets to
//! line/column positions with [`LineMap`].

use crate::IndexerError;
use regex::Regex;
use std::ops::Range;

/// Default marker alternation used when no pattern is configured.
pub const DEFAULT_MARKER_PATTERN: &str = "TODO|FIXME|HACK|XXX|BUG|NOTE";

/// Comment-opening tokens a marker may follow: line comments, block-comment
/// openers, hash, markup comments, triple-quote delimiters, SQL-style double
/// dash, lisp/asm semicolons, TeX percent, and block-comment continuation
/// asterisks. Longer tokens come first so alternation prefers them.
const OPENERS: &str = r#"<!--|//+|/\*+|#+|--+|;+|%+|"""|'''|\*"#;

/// Tokens that terminate a message before end of line.
const CLOSERS: &str = r#"-->|\*/|"""|'''|\r?$"#;

/// One raw extraction candidate: normalized marker, trimmed message, and the
/// byte range of the full matched comment annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    pub kind: String,
    pub message: String,
    pub span: Range<usize>,
}

/// Compiled annotation extractor.
///
/// The caller-supplied marker pattern is inserted verbatim into the marker
/// group, so `TODO|FIXME` scans for either marker. A pattern that does not
/// compile fails construction, and with it the whole scan.
///
/// Text scanning cannot distinguish annotations inside string literals from
/// real comments; those false positives are accepted.
#[derive(Debug, Clone)]
pub struct Extractor {
    regex: Regex,
}

impl Extractor {
    /// Compile an extractor for the given marker sub-expression.
    pub fn new(marker_pattern: &str) -> Result<Self, IndexerError> {
        let source = format!(
            r"(?im)(?:{OPENERS})[ \t]*(?P<kind>{marker_pattern})\b[ \t]*[:\-]?[ \t]*(?P<msg>[^\r\n]*?)[ \t]*(?:{CLOSERS})"
        );

        let regex = Regex::new(&source).map_err(|e| IndexerError::Pattern {
            message: e.to_string(),
        })?;

        Ok(Self { regex })
    }

    /// Extract all annotation candidates from `text`, in source order.
    ///
    /// Candidates with an empty marker or an empty message after trimming
    /// are silently dropped.
    pub fn extract(&self, text: &str) -> Vec<RawMatch> {
        let mut matches = Vec::new();

        for caps in self.regex.captures_iter(text) {
            let full = match caps.get(0) {
                Some(m) => m,
                None => continue,
            };

            let kind = caps
                .name("kind")
                .map(|m| m.as_str().trim().to_uppercase())
                .unwrap_or_default();
            let message = caps
                .name("msg")
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();

            if kind.is_empty() || message.is_empty() {
                continue;
            }

            matches.push(RawMatch {
                kind,
                message,
                span: full.start()..full.end(),
            });
        }

        matches
    }
}

/// Precomputed line-start offsets for byte-offset to position conversion.
pub struct LineMap {
    line_starts: Vec<usize>,
}

impl LineMap {
    /// Build a line map for `text`.
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Convert a byte offset to a 0-based (line, byte column) pair.
    ///
    /// Offsets past the end of text resolve to the last line.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let column = offset - self.line_starts[line];
        (line as u32, column as u32)
    }

    /// Number of lines in the mapped text.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}
