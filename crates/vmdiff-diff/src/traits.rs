use std::collections::{BTreeMap, BTreeSet};

use vmdiff_types::Diff;

/// Which key space a differ produces keys in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntitySpace {
    /// Absolute POSIX paths. The hierarchy is the path hierarchy.
    FileSystem,
    /// Decimal process ids. The hierarchy comes from recorded parent ids.
    Process,
}

/// Finds changed entities between two snapshots and diffs them.
///
/// All implementations must satisfy these invariants:
/// - `list_changed_keys` is computed once and returns the same set on every
///   call.
/// - `diff` is memoized per key. `None` means no observable difference (or
///   the entity was filtered out by policy).
/// - A key's diff depends only on that key's before/after entities.
pub trait EntityDiffer {
    fn space(&self) -> EntitySpace;

    /// Keys whose entities differ between the snapshots.
    fn list_changed_keys(&self) -> &BTreeSet<String>;

    /// Diff one entity.
    fn diff(&mut self, key: &str) -> Option<Diff>;

    /// Diff every changed key, dropping keys without a diff.
    fn diff_all(&mut self) -> BTreeMap<String, Diff> {
        let keys: Vec<String> = self.list_changed_keys().iter().cloned().collect();
        let mut results = BTreeMap::new();
        for key in keys {
            if let Some(diff) = self.diff(&key) {
                results.insert(key, diff);
            }
        }
        results
    }
}
