//! Error types for the diff cache.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while writing or reading the cache.
///
/// A missing key is not an error: lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A key cannot be mapped to a location inside the cache.
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),

    /// The cache was read before a writer finished it.
    #[error("cache at {} not ready after {waited:?}", path.display())]
    NotReady {
        /// The run directory that was polled.
        path: PathBuf,
        /// How long the caller waited.
        waited: Duration,
    },

    /// Tree index (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walking the body store failed.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for cache results.
pub type CacheResult<T> = Result<T, CacheError>;
