//! Diff engine for vmdiff.
//!
//! Compares two captured system states entity by entity and renders each
//! change as a self-describing unified patch. Filesystem entities are
//! compared on stat attributes, timestamps, extended attributes and content;
//! processes are compared as canonical JSON records.
//!
//! # Key Types
//!
//! - [`EntityDiffer`] -- Contract shared by both entity spaces
//! - [`FileSystemDiffer`] / [`DiffOptions`] -- Path-keyed snapshot comparison
//! - [`ProcessDiffer`] / [`ProcessSnapshot`] -- Process-list comparison
//! - [`UnifiedDiff`] -- Status and line counts parsed from a merged body
//! - [`ContentHasher`] / [`Digest`] -- Domain-separated BLAKE3 hashing

pub mod content;
pub mod error;
pub mod filesystem;
pub mod hasher;
pub mod line_diff;
pub mod options;
pub mod process;
pub mod traits;
pub mod unified;

pub use error::{DiffError, DiffResult};
pub use filesystem::FileSystemDiffer;
pub use hasher::{ContentHasher, Digest};
pub use line_diff::{unified_diff, Context};
pub use options::DiffOptions;
pub use process::{CommandLine, EnvironmentVariable, ProcessDiffer, ProcessRecord, ProcessSnapshot};
pub use traits::{EntityDiffer, EntitySpace};
pub use unified::UnifiedDiff;
