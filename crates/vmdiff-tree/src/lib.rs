//! Diff tree assembly for vmdiff.
//!
//! Turns the flat key → [`Diff`](vmdiff_types::Diff) map produced by an
//! [`EntityDiffer`](vmdiff_diff::EntityDiffer) into a single-rooted tree of
//! [`Node`](vmdiff_types::Node)s with roll-up statistics, stored as a forest
//! plus a children index.
//!
//! # Key Types
//!
//! - [`DiffTree`] -- Builds, caches and merges tree indexes
//! - [`TreeError`] -- Merge failures

pub mod error;
pub mod tree;

pub use error::{TreeError, TreeResult};
pub use tree::{assemble, DiffTree};
