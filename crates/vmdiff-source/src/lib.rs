//! Snapshot sources for vmdiff.
//!
//! Reads the two kinds of captured state the diff engine compares: a mounted
//! or extracted filesystem tree, exposed as [`FileEntry`](vmdiff_types::FileEntry)
//! values keyed by absolute path, and the JSON output of memory-analysis
//! plugins, assembled into a [`ProcessSnapshot`](vmdiff_diff::ProcessSnapshot).
//!
//! # Key Types
//!
//! - [`DirectoryLister`] / [`LocalFileEntry`] -- Filesystem snapshot listing
//! - [`MemorySnapshots`] -- Before/after process snapshots from plugin output

pub mod error;
pub mod lister;
pub mod memory;

pub use error::{SourceError, SourceResult};
pub use lister::{DirectoryLister, LocalFileEntry};
pub use memory::{MemorySnapshots, CMDLINE_PLUGIN, DEFAULT_PLUGINS, ENVARS_PLUGIN, PSLIST_PLUGIN};
