//! Static API export of a finished cache.
//!
//! Writes everything the browsing surface queries as plain files, so a run
//! can be served without a live cache reader:
//!
//! ```text
//! tree/json/changed_files       forest
//! tree/json/children/<hash>     children of one key
//! tree/json/diff/<hash>         body lines of one key
//! ```
//!
//! `<hash>` is the hex key digest from [`api_file_name`].

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::info;
use vmdiff_diff::ContentHasher;

use crate::error::CacheResult;
use crate::store::DiffCache;

pub const FOREST_FILE: &str = "changed_files";
pub const CHILDREN_DIR: &str = "children";
pub const DIFF_DIR: &str = "diff";

/// File name under which a key's children and diff are exported.
pub fn api_file_name(key: &str) -> String {
    ContentHasher::KEY.hash(key.as_bytes()).to_hex()
}

/// What a materialization pass produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaterializeSummary {
    pub children_files: usize,
    pub diff_files: usize,
    /// `true` when existing output was reused and nothing was written.
    pub reused: bool,
}

/// Flattens a ready [`DiffCache`] into static per-key files.
pub struct ApiMaterializer<'a> {
    cache: &'a DiffCache,
}

impl<'a> ApiMaterializer<'a> {
    pub fn new(cache: &'a DiffCache) -> Self {
        Self { cache }
    }

    /// Export the cache. With `reuse`, an existing export is left untouched.
    pub fn materialize(&self, reuse: bool) -> CacheResult<MaterializeSummary> {
        let dir = self.cache.layout().api_dir();
        if reuse && dir.is_dir() {
            info!(dir = %dir.display(), "API data already exported");
            return Ok(MaterializeSummary {
                reused: true,
                ..MaterializeSummary::default()
            });
        }

        let index = self.cache.load_tree_index()?;
        let children_dir = dir.join(CHILDREN_DIR);
        let diff_dir = dir.join(DIFF_DIR);
        fs::create_dir_all(&children_dir)?;
        fs::create_dir_all(&diff_dir)?;

        write_json(&dir.join(FOREST_FILE), &index.forest)?;

        let mut summary = MaterializeSummary::default();
        for (key, children) in &index.children {
            let name = api_file_name(key);
            write_json(&children_dir.join(&name), children)?;
            summary.children_files += 1;

            if let Some(diff) = self.cache.get_diff(key)? {
                write_json(&diff_dir.join(&name), &diff.body)?;
                summary.diff_files += 1;
            }
        }

        info!(
            dir = %dir.display(),
            children = summary.children_files,
            diffs = summary.diff_files,
            "exported API data"
        );
        Ok(summary)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> CacheResult<()> {
    fs::write(path, serde_json::to_vec(value)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vmdiff_diff::UnifiedDiff;
    use vmdiff_types::{ChildrenIndex, Diff, DiffStatus, Node, TreeIndex};

    use crate::layout::RunLayout;

    fn node(key: &str, title: &str, is_directory: bool) -> Node {
        Node {
            key: key.to_string(),
            title: title.to_string(),
            is_leaf: !is_directory,
            is_directory,
            status: DiffStatus::Added,
            lines_added: 1,
            lines_removed: 0,
            num_children: 0,
            num_direct_children: 0,
        }
    }

    fn ready_cache(dir: &Path) -> DiffCache {
        let cache = DiffCache::new(RunLayout::new(dir, "run"));
        let body = vec![
            "diff --git /new /new".to_string(),
            "new file mode 100644".to_string(),
            "--- /new".to_string(),
            "+++ /new".to_string(),
            "@@ -0,0 +1 @@".to_string(),
            "+hi".to_string(),
        ];
        let diff: Diff = UnifiedDiff::new(body).into_diff("/new", false, "new", None);
        let diffs: BTreeMap<String, Diff> = [("/new".to_string(), diff)].into();
        cache.store_filesystem(&diffs).unwrap();

        let mut root = node("/", "/", true);
        root.status = DiffStatus::Unchanged;
        let mut children = ChildrenIndex::new();
        children.insert("/".to_string(), vec![node("/new", "new", false)]);
        children.insert("/new".to_string(), Vec::new());
        cache.store_tree(&TreeIndex::new(vec![root], children)).unwrap();
        cache
    }

    #[test]
    fn exports_forest_children_and_diffs() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ready_cache(tmp.path());

        let summary = ApiMaterializer::new(&cache).materialize(false).unwrap();
        assert_eq!(summary.children_files, 2);
        assert_eq!(summary.diff_files, 1);
        assert!(!summary.reused);

        let api = cache.layout().api_dir();
        let forest: Vec<Node> =
            serde_json::from_slice(&fs::read(api.join(FOREST_FILE)).unwrap()).unwrap();
        assert_eq!(forest[0].key, "/");

        let name = api_file_name("/new");
        let body: Vec<String> =
            serde_json::from_slice(&fs::read(api.join(DIFF_DIR).join(&name)).unwrap()).unwrap();
        assert_eq!(body.last().unwrap(), "+hi");
        assert!(!api.join(DIFF_DIR).join(api_file_name("/")).exists());

        let root_children: Vec<Node> = serde_json::from_slice(
            &fs::read(api.join(CHILDREN_DIR).join(api_file_name("/"))).unwrap(),
        )
        .unwrap();
        assert_eq!(root_children.len(), 1);
    }

    #[test]
    fn reuse_skips_existing_export() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ready_cache(tmp.path());
        ApiMaterializer::new(&cache).materialize(false).unwrap();
        let again = ApiMaterializer::new(&cache).materialize(true).unwrap();
        assert!(again.reused);
        assert_eq!(again.diff_files, 0);
    }

    #[test]
    fn file_names_are_stable_hex() {
        assert_eq!(api_file_name("/etc/hosts"), api_file_name("/etc/hosts"));
        assert_ne!(api_file_name("/etc/hosts"), api_file_name("/etc/host"));
        assert_eq!(api_file_name("4").len(), 64);
    }
}
