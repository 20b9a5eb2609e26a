//! Foundation types for vmdiff.
//!
//! This crate provides the records shared by every other vmdiff crate: the
//! per-entity [`Diff`], the tree [`Node`] and its [`ChildrenIndex`], the key
//! helpers that understand both entity spaces (filesystem paths and process
//! ids), and the [`FileEntry`] contract that snapshot traversal code
//! implements.
//!
//! # Key Types
//!
//! - [`Diff`] / [`DiffStatus`] -- Change record for one entity between two snapshots
//! - [`Node`] -- Tree node with roll-up statistics
//! - [`TreeIndex`] -- Forest plus children index, the persisted tree shape
//! - [`FileEntry`] -- What a traversal library must expose per path
//! - [`MemoryEntry`] -- In-memory [`FileEntry`] for tests and embedding

pub mod diff;
pub mod entry;
pub mod key;
pub mod node;

pub use diff::{Diff, DiffStatus};
pub use entry::{EntryKind, ExtendedAttribute, FileEntry, MemoryEntry, StatAttributes, Timestamps};
pub use node::{ChildrenIndex, Forest, Node, TreeIndex};
