use std::fmt;

use serde::{Deserialize, Serialize};

/// How an entity changed between the "before" and "after" snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    /// Present only in the "after" snapshot.
    Added,
    /// Present only in the "before" snapshot.
    Removed,
    /// Present in both, with at least one observable difference.
    Modified,
    /// No change of its own. Used for synthesized ancestor nodes.
    Unchanged,
}

impl DiffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
            Self::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The computed change record for one entity.
///
/// `body` holds the merged patch text, one element per line without the
/// trailing newline. `status`, `lines_added` and `lines_removed` are always
/// derived from `body`, never set independently. A `Diff` is produced once by
/// an entity differ and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    /// Entity key: an absolute POSIX path or a decimal process id.
    pub key: String,
    pub status: DiffStatus,
    pub is_directory: bool,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub body: Vec<String>,
    /// Display name in the tree.
    pub title: String,
    /// Parent entity key. Only process diffs carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
}

impl Diff {
    /// The body as patch text, each line newline-terminated.
    pub fn to_patch(&self) -> String {
        let mut out = String::with_capacity(self.body.iter().map(|l| l.len() + 1).sum());
        for line in &self.body {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}
