//! Error types for snapshot sources.

use std::path::PathBuf;

/// Errors that can occur while reading a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// An ignore pattern did not compile.
    #[error("invalid ignore pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A required plugin output file does not exist.
    #[error("missing plugin output: {}", path.display())]
    MissingPlugin {
        /// The file that was expected.
        path: PathBuf,
    },

    /// Plugin output was not the expected JSON shape.
    #[error("invalid plugin output {}: {source}", path.display())]
    InvalidPluginOutput {
        /// The offending file.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// The snapshot root cannot be listed.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for source results.
pub type SourceResult<T> = Result<T, SourceError>;
