//! Error types for the diff crate.

/// Errors that can occur while setting up or running a differ.
///
/// Per-entity problems (unreadable streams, oversized files) are not errors:
/// they are logged and degrade the entity's diff instead.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The process suppression pattern did not compile.
    #[error("invalid process filter regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
