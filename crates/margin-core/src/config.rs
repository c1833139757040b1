//! Configuration for the Margin index service.

use margin_indexer::{ScanOptions, DEFAULT_BATCH_SIZE, DEFAULT_MARKER_PATTERN};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Regex sub-expression for the marker alternation. Changing this
    /// affects only future scans.
    #[serde(default = "default_marker_pattern")]
    pub marker_pattern: String,

    /// Include globs, relative to the workspace root
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,

    /// Exclude globs; bare names match directories anywhere in the tree
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,

    /// Files per scan batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Resolve authors per annotation
    #[serde(default)]
    pub enable_author_lookup: bool,

    /// Upper bound on one author lookup, in milliseconds
    #[serde(default = "default_author_timeout_ms")]
    pub author_timeout_ms: u64,

    /// Debounce window for file watching, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Log skipped files
    #[serde(default)]
    pub debug: bool,
}

fn default_marker_pattern() -> String {
    DEFAULT_MARKER_PATTERN.to_string()
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_exclude_globs() -> Vec<String> {
    ["node_modules", "target", "dist", "build", "vendor"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_author_timeout_ms() -> u64 {
    300
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".margin")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            marker_pattern: default_marker_pattern(),
            include_globs: default_include_globs(),
            exclude_globs: default_exclude_globs(),
            batch_size: default_batch_size(),
            enable_author_lookup: false,
            author_timeout_ms: default_author_timeout_ms(),
            debounce_ms: default_debounce_ms(),
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults on a missing or malformed file.
    pub fn load() -> Self {
        let config_path = default_data_dir().join("config.yaml");

        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_yaml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config file: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Convert into the engine's scan options
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            marker_pattern: self.marker_pattern.clone(),
            include_globs: self.include_globs.clone(),
            exclude_globs: self.exclude_globs.clone(),
            batch_size: self.batch_size,
            enable_author_lookup: self.enable_author_lookup,
            author_timeout: Duration::from_millis(self.author_timeout_ms),
            debug: self.debug,
        }
    }

    /// Debounce window for file watching
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
