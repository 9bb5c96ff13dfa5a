//! Error types for scour

use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Result type alias using scour's Error
pub type Result<T> = std::result::Result<T, Error>;

/// scour error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("workspace error: {message}")]
    Workspace { message: String },

    #[error("{location}: {message}")]
    Cpp { location: String, message: String },

    #[error("{location}: {message}")]
    Parse { location: String, message: String },

    #[error("invalid query: {message}")]
    Query { message: String },

    #[error("rewrite error on {path}: {message}")]
    Rewrite { path: PathBuf, message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Running totals of recoverable diagnostics.
///
/// Preprocessing and parse errors never abort analysis: they are logged,
/// counted, and the pipeline resumes at a resynchronization point.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub cpp_errors: usize,
    pub parse_errors: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a recoverable preprocessing error at `location` (path:line).
    pub fn cpp_error(&mut self, location: &str, message: &str) {
        self.cpp_errors += 1;
        warn!("{location}: {message}");
    }

    /// Report a recoverable parse error at `location`.
    pub fn parse_error(&mut self, location: &str, message: &str) {
        self.parse_errors += 1;
        warn!("{location}: {message}");
    }

    pub fn total(&self) -> usize {
        self.cpp_errors + self.parse_errors
    }
}
