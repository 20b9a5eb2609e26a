//! Typed view over a finished, merged patch body.

use vmdiff_types::{Diff, DiffStatus};

/// A merged patch body plus the status and line counts derived from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnifiedDiff {
    body: Vec<String>,
    status: DiffStatus,
    lines_added: usize,
    lines_removed: usize,
}

impl UnifiedDiff {
    /// Parse a merged body.
    ///
    /// The second line decides the status: `new…` means added, `deleted…`
    /// means removed, anything else is a modification. Added and removed
    /// lines are counted from the first `@@` header onward, so the `---` and
    /// `+++` path headers never count.
    pub fn new(body: Vec<String>) -> Self {
        let status = match body.get(1) {
            Some(line) if line.starts_with("new") => DiffStatus::Added,
            Some(line) if line.starts_with("deleted") => DiffStatus::Removed,
            _ => DiffStatus::Modified,
        };

        let mut lines_added = 0;
        let mut lines_removed = 0;
        for line in body.iter().skip_while(|l| !l.starts_with("@@")) {
            if line.starts_with('+') {
                lines_added += 1;
            } else if line.starts_with('-') {
                lines_removed += 1;
            }
        }

        Self {
            body,
            status,
            lines_added,
            lines_removed,
        }
    }

    pub fn status(&self) -> DiffStatus {
        self.status
    }

    pub fn lines_added(&self) -> usize {
        self.lines_added
    }

    pub fn lines_removed(&self) -> usize {
        self.lines_removed
    }

    pub fn body(&self) -> &[String] {
        &self.body
    }

    /// Wrap into an entity [`Diff`].
    pub fn into_diff(
        self,
        key: impl Into<String>,
        is_directory: bool,
        title: impl Into<String>,
        parent_key: Option<String>,
    ) -> Diff {
        Diff {
            key: key.into(),
            status: self.status,
            is_directory,
            lines_added: self.lines_added,
            lines_removed: self.lines_removed,
            body: self.body,
            title: title.into(),
            parent_key,
        }
    }
}
