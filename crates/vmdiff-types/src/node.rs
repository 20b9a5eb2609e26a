//! Tree nodes and the persisted tree shape.
//!
//! Nodes never embed their children. A [`ChildrenIndex`] maps every node key
//! to its ordered child list instead, which keeps each node small enough to
//! ship one level at a time to a browsing client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diff::DiffStatus;

/// A node in the diff tree.
///
/// Field names serialize in camelCase, the shape browsing clients consume.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub key: String,
    pub title: String,
    pub is_leaf: bool,
    pub is_directory: bool,
    pub status: DiffStatus,
    pub lines_added: usize,
    pub lines_removed: usize,
    /// Non-directory descendants, counted recursively.
    pub num_children: usize,
    /// Non-directory direct children.
    pub num_direct_children: usize,
}

/// Ordered root-level nodes. Normally holds a single root per entity space.
pub type Forest = Vec<Node>;

/// Node key to its children, each list in ascending key order.
pub type ChildrenIndex = BTreeMap<String, Vec<Node>>;

/// A built tree: the forest plus its children index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeIndex {
    pub forest: Forest,
    pub children: ChildrenIndex,
}

impl TreeIndex {
    pub fn new(forest: Forest, children: ChildrenIndex) -> Self {
        Self { forest, children }
    }

    /// Returns `true` if the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.forest.is_empty()
    }

    /// The children of `key`, or an empty slice for unknown keys.
    pub fn children_of(&self, key: &str) -> &[Node] {
        self.children.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of nodes reachable from the forest.
    pub fn len(&self) -> usize {
        self.forest.len() + self.children.values().map(Vec::len).sum::<usize>()
    }

    /// Look up a node by key, searching roots then every child list.
    pub fn find(&self, key: &str) -> Option<&Node> {
        self.forest
            .iter()
            .chain(self.children.values().flatten())
            .find(|node| node.key == key)
    }
}
