use std::path::{Path, PathBuf};

/// Directory layout of one cached run:
///
/// ```text
/// <results>/<run_id>/
///     disk/      filesystem bodies, mirroring the snapshot's paths
///     memory/    process bodies, one file per process id
///     tree/      tree.json, children.json
///     tree/json/ static API files
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    pub fn new(results_dir: impl AsRef<Path>, run_id: &str) -> Self {
        Self {
            root: results_dir.as_ref().join(run_id),
        }
    }

    /// Use `root` directly as the run directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn disk_dir(&self) -> PathBuf {
        self.root.join("disk")
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.root.join("memory")
    }

    pub fn tree_dir(&self) -> PathBuf {
        self.root.join("tree")
    }

    pub fn api_dir(&self) -> PathBuf {
        self.tree_dir().join("json")
    }
}
