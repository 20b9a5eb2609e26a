//! Error types for tree assembly.

/// Errors that can occur while combining diff trees.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Both trees contain a node with the same key.
    #[error("key present in both trees: {0}")]
    KeyCollision(String),
}

/// Convenience alias for tree results.
pub type TreeResult<T> = Result<T, TreeError>;
