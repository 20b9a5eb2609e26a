//! The diff cache: bodies mirrored onto the filesystem plus the tree index.
//!
//! Filesystem bodies live at `disk/<key>`. A directory entity's own body is
//! stored as `disk/<key>/.__this_directory__`, so it can sit beside the
//! bodies of its children. Process bodies are flat: `memory/<pid>`, with
//! titles and parent ids kept in `memory/processes.json`.
//!
//! # Invariants
//!
//! - The cache is ready only once a body store and both tree blobs exist.
//! - Storing bodies drops the tree blobs first, so a store being rewritten
//!   reads as not ready until `store_tree` runs again.
//! - A store holds exactly the last map written to it.
//! - Tree blobs are replaced atomically; readers never see a torn file.
//! - A path whose type flipped between runs is renamed aside, never removed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use vmdiff_diff::content::split_lines;
use vmdiff_diff::UnifiedDiff;
use vmdiff_types::key::{
    components, file_name, is_process_key, normalize_path, PROCESS_ROOT_KEY, ROOT_PATH,
};
use vmdiff_types::{ChildrenIndex, Diff, Forest, Node, TreeIndex};

use crate::error::{CacheError, CacheResult};
use crate::layout::RunLayout;

/// File holding a directory entity's own body.
pub const SENTINEL_FILE: &str = ".__this_directory__";

/// Suffix for entries moved out of the way by a type flip.
pub const RENAMED_SUFFIX: &str = ".__renamed__";

pub const TREE_FILE: &str = "tree.json";
pub const CHILDREN_FILE: &str = "children.json";

/// Per-process metadata stored beside the process bodies.
pub const PROCESS_INDEX_FILE: &str = "processes.json";

/// What a process body alone cannot reproduce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRecord {
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_key: Option<String>,
}

type ProcessIndex = BTreeMap<String, ProcessRecord>;

/// Reads and writes one run's cached diffs.
#[derive(Clone, Debug)]
pub struct DiffCache {
    layout: RunLayout,
}

impl DiffCache {
    pub fn new(layout: RunLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    // ---------------------------------------------------------------
    // Writing
    // ---------------------------------------------------------------

    /// Write filesystem bodies, mirroring each key under `disk/`.
    ///
    /// Bodies left over from an earlier store whose keys are not in `diffs`
    /// are pruned. Returns the number of bodies written.
    pub fn store_filesystem(&self, diffs: &BTreeMap<String, Diff>) -> CacheResult<usize> {
        self.invalidate_tree()?;
        let disk = self.layout.disk_dir();
        fs::create_dir_all(&disk)?;

        for (key, diff) in diffs {
            let parts = path_parts(key)?;
            let mut dir = disk.clone();
            for part in parts.iter().take(parts.len().saturating_sub(1)) {
                dir.push(part);
                ensure_dir(&dir)?;
            }

            let target = if diff.is_directory || parts.is_empty() {
                if let Some(last) = parts.last() {
                    dir.push(last);
                    ensure_dir(&dir)?;
                }
                dir.join(SENTINEL_FILE)
            } else {
                let target = dir.join(&parts[parts.len() - 1]);
                if target.is_dir() {
                    rename_aside(&target)?;
                }
                target
            };

            fs::write(&target, diff.to_patch())?;
            debug!(key = %key, path = %target.display(), "stored body");
        }

        let keep: BTreeSet<String> = diffs.keys().map(|k| normalize_path(k)).collect();
        let mut pruned = 0usize;
        for body in self.filesystem_bodies()? {
            if !keep.contains(&body.key) {
                fs::remove_file(&body.path)?;
                pruned += 1;
            }
        }

        info!(count = diffs.len(), pruned, dir = %disk.display(), "stored filesystem diffs");
        Ok(diffs.len())
    }

    /// Write process bodies, one file per process id under `memory/`, plus
    /// the process index holding each title and parent id.
    pub fn store_processes(&self, diffs: &BTreeMap<String, Diff>) -> CacheResult<usize> {
        if let Some(bad) = diffs.keys().find(|pid| !is_process_key(pid)) {
            return Err(CacheError::InvalidKey(bad.clone()));
        }
        self.invalidate_tree()?;
        let dir = self.layout.memory_dir();
        fs::create_dir_all(&dir)?;

        let mut index = ProcessIndex::new();
        for (pid, diff) in diffs {
            fs::write(dir.join(pid), diff.to_patch())?;
            index.insert(
                pid.clone(),
                ProcessRecord {
                    title: diff.title.clone(),
                    parent_key: diff.parent_key.clone(),
                },
            );
        }
        write_json_atomic(&dir, PROCESS_INDEX_FILE, &index)?;

        let mut pruned = 0usize;
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if is_process_key(&name) && !diffs.contains_key(&name) {
                fs::remove_file(dir.join(&name))?;
                pruned += 1;
            }
        }

        info!(count = diffs.len(), pruned, dir = %dir.display(), "stored process diffs");
        Ok(diffs.len())
    }

    /// Persist the forest and children index.
    ///
    /// The children blob is written first, so a visible `tree.json` implies a
    /// complete index.
    pub fn store_tree(&self, index: &TreeIndex) -> CacheResult<()> {
        let dir = self.layout.tree_dir();
        fs::create_dir_all(&dir)?;
        write_json_atomic(&dir, CHILDREN_FILE, &index.children)?;
        write_json_atomic(&dir, TREE_FILE, &index.forest)?;
        info!(nodes = index.len(), dir = %dir.display(), "stored tree index");
        Ok(())
    }

    /// Drop the tree blobs and the API export built from them.
    ///
    /// `tree.json` goes first: without it the cache reads as not ready.
    fn invalidate_tree(&self) -> CacheResult<()> {
        let dir = self.layout.tree_dir();
        for name in [TREE_FILE, CHILDREN_FILE] {
            let path = dir.join(name);
            if path.is_file() {
                fs::remove_file(&path)?;
                debug!(path = %path.display(), "dropped stale tree blob");
            }
        }
        let api = self.layout.api_dir();
        if api.is_dir() {
            fs::remove_dir_all(&api)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Readiness
    // ---------------------------------------------------------------

    /// Returns `true` once a body store and both tree blobs exist.
    pub fn is_ready(&self) -> bool {
        let tree = self.layout.tree_dir();
        let has_bodies = self.layout.disk_dir().is_dir() || self.layout.memory_dir().is_dir();
        has_bodies && tree.join(TREE_FILE).is_file() && tree.join(CHILDREN_FILE).is_file()
    }

    /// Returns `true` if process bodies were stored for this run.
    pub fn has_process_store(&self) -> bool {
        self.layout.memory_dir().is_dir()
    }

    /// Block until the cache is ready, polling every `poll`.
    pub fn wait_until_ready(&self, poll: Duration, timeout: Duration) -> CacheResult<()> {
        let start = Instant::now();
        loop {
            if self.is_ready() {
                return Ok(());
            }
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(CacheError::NotReady {
                    path: self.layout.root().to_path_buf(),
                    waited,
                });
            }
            debug!(path = %self.layout.root().display(), "cache not ready; waiting");
            std::thread::sleep(poll.min(timeout - waited));
        }
    }

    fn ensure_ready(&self) -> CacheResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(CacheError::NotReady {
                path: self.layout.root().to_path_buf(),
                waited: Duration::ZERO,
            })
        }
    }

    // ---------------------------------------------------------------
    // Reading
    // ---------------------------------------------------------------

    /// Fetch one diff. Process ids go to the process store, everything else
    /// to the filesystem store. Unknown keys yield `Ok(None)`.
    pub fn get_diff(&self, key: &str) -> CacheResult<Option<Diff>> {
        self.ensure_ready()?;
        if is_process_key(key) {
            return self.read_process_diff(key, &self.process_index()?);
        }
        if key == PROCESS_ROOT_KEY {
            return Ok(None);
        }

        let parts = path_parts(key)?;
        let mut path = self.layout.disk_dir();
        path.extend(&parts);

        let sentinel = path.join(SENTINEL_FILE);
        let (body_path, is_directory) = if sentinel.is_file() {
            (sentinel, true)
        } else if path.is_file() {
            (path, false)
        } else {
            return Ok(None);
        };

        let key = normalize_path(key);
        let body = read_body(&body_path)?;
        let title = file_name(&key).to_string();
        Ok(Some(UnifiedDiff::new(body).into_diff(key, is_directory, title, None)))
    }

    fn read_process_diff(&self, pid: &str, index: &ProcessIndex) -> CacheResult<Option<Diff>> {
        let path = self.layout.memory_dir().join(pid);
        if !path.is_file() {
            debug!(pid, "process diff not cached");
            return Ok(None);
        }
        let body = read_body(&path)?;
        let (title, parent_key) = match index.get(pid) {
            Some(record) => (record.title.clone(), record.parent_key.clone()),
            None => (pid.to_string(), None),
        };
        Ok(Some(UnifiedDiff::new(body).into_diff(pid, false, title, parent_key)))
    }

    fn process_index(&self) -> CacheResult<ProcessIndex> {
        let path = self.layout.memory_dir().join(PROCESS_INDEX_FILE);
        if !path.is_file() {
            return Ok(ProcessIndex::new());
        }
        read_json(&path)
    }

    /// Every body file in the filesystem store, skipping renamed-aside entries.
    fn filesystem_bodies(&self) -> CacheResult<Vec<StoredBody>> {
        let disk = self.layout.disk_dir();
        if !disk.is_dir() {
            return Ok(Vec::new());
        }
        let walker = WalkDir::new(&disk)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().contains(RENAMED_SUFFIX));

        let mut bodies = Vec::new();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&disk).unwrap_or(entry.path());
            let is_directory = entry.file_name() == SENTINEL_FILE;
            let relative = if is_directory {
                relative.parent().unwrap_or(Path::new(""))
            } else {
                relative
            };
            bodies.push(StoredBody {
                key: key_from_relative(relative),
                is_directory,
                path: entry.into_path(),
            });
        }
        Ok(bodies)
    }

    /// Re-hydrate every cached diff by walking both body stores.
    pub fn load_all(&self) -> CacheResult<BTreeMap<String, Diff>> {
        self.ensure_ready()?;
        let mut diffs = BTreeMap::new();

        for stored in self.filesystem_bodies()? {
            let body = read_body(&stored.path)?;
            let title = file_name(&stored.key).to_string();
            let diff = UnifiedDiff::new(body).into_diff(
                stored.key.clone(),
                stored.is_directory,
                title,
                None,
            );
            diffs.insert(stored.key, diff);
        }

        let memory = self.layout.memory_dir();
        if memory.is_dir() {
            let index = self.process_index()?;
            for entry in fs::read_dir(&memory)? {
                let name = entry?.file_name().to_string_lossy().into_owned();
                if !is_process_key(&name) {
                    continue;
                }
                if let Some(diff) = self.read_process_diff(&name, &index)? {
                    diffs.insert(name, diff);
                }
            }
        }

        info!(count = diffs.len(), path = %self.layout.root().display(), "loaded cached diffs");
        Ok(diffs)
    }

    /// Load the persisted forest and children index.
    pub fn load_tree_index(&self) -> CacheResult<TreeIndex> {
        self.ensure_ready()?;
        let dir = self.layout.tree_dir();
        let forest: Forest = read_json(&dir.join(TREE_FILE))?;
        let children: ChildrenIndex = read_json(&dir.join(CHILDREN_FILE))?;
        Ok(TreeIndex::new(forest, children))
    }

    /// The persisted forest.
    pub fn forest(&self) -> CacheResult<Forest> {
        self.ensure_ready()?;
        read_json(&self.layout.tree_dir().join(TREE_FILE))
    }

    /// The persisted children of `key`; empty for unknown keys.
    pub fn children(&self, key: &str) -> CacheResult<Vec<Node>> {
        let mut index = self.load_tree_index()?;
        Ok(index.children.remove(key).unwrap_or_default())
    }
}

struct StoredBody {
    key: String,
    is_directory: bool,
    path: PathBuf,
}

/// Split a filesystem key into validated path components.
fn path_parts(key: &str) -> CacheResult<Vec<String>> {
    let normalized = normalize_path(key);
    let parts: Vec<String> = components(&normalized)
        .into_iter()
        .map(str::to_string)
        .collect();
    for part in &parts {
        if part == "." || part == ".." || part == SENTINEL_FILE || part.contains(RENAMED_SUFFIX) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
    }
    Ok(parts)
}

fn key_from_relative(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ROOT_PATH.to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Make `dir` a directory, renaming aside a file that occupies its path.
fn ensure_dir(dir: &Path) -> CacheResult<()> {
    if dir.is_dir() {
        return Ok(());
    }
    if dir.exists() {
        rename_aside(dir)?;
    }
    fs::create_dir(dir)?;
    Ok(())
}

/// Move `path` to the first free `<path>.__renamed__[N]`.
fn rename_aside(path: &Path) -> CacheResult<PathBuf> {
    let base = path.as_os_str().to_string_lossy().into_owned();
    let mut candidate = PathBuf::from(format!("{base}{RENAMED_SUFFIX}"));
    let mut counter = 1u32;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{base}{RENAMED_SUFFIX}{counter}"));
        counter += 1;
    }
    fs::rename(path, &candidate)?;
    warn!(
        from = %path.display(),
        to = %candidate.display(),
        "entity changed type between runs; moved previous entry aside"
    );
    Ok(candidate)
}

fn read_body(path: &Path) -> CacheResult<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(split_lines(&text))
}

fn write_json_atomic<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> CacheResult<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    tmp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CacheResult<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmdiff_types::DiffStatus;

    fn cache() -> (tempfile::TempDir, DiffCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiffCache::new(RunLayout::new(dir.path(), "run"));
        (dir, cache)
    }

    fn fs_diff(key: &str, is_directory: bool) -> Diff {
        let body = vec![
            format!("diff --git {key} {key}"),
            format!("--- {key}"),
            format!("+++ {key}"),
            "@@ -1 +1 @@ stat attributes".to_string(),
            "-mode: drwxr-xr-x".to_string(),
            "+mode: drwx------".to_string(),
        ];
        UnifiedDiff::new(body).into_diff(key, is_directory, file_name(key), None)
    }

    fn process_diff(pid: &str, title: &str, parent: Option<&str>) -> Diff {
        let body = vec![
            format!("diff --git {title} {title}"),
            "new file".to_string(),
            format!("--- {title}"),
            format!("+++ {title}"),
            "@@ -0,0 +1 @@".to_string(),
            "+{}".to_string(),
        ];
        UnifiedDiff::new(body).into_diff(pid, false, title, parent.map(str::to_string))
    }

    fn diffs(items: Vec<Diff>) -> BTreeMap<String, Diff> {
        items.into_iter().map(|d| (d.key.clone(), d)).collect()
    }

    fn leaf(key: &str) -> Node {
        Node {
            key: key.to_string(),
            title: file_name(key).to_string(),
            is_leaf: true,
            is_directory: false,
            status: DiffStatus::Modified,
            lines_added: 1,
            lines_removed: 1,
            num_children: 0,
            num_direct_children: 0,
        }
    }

    fn small_index() -> TreeIndex {
        let mut root = leaf("/");
        root.is_leaf = false;
        root.is_directory = true;
        root.num_children = 1;
        root.num_direct_children = 1;
        let mut children = ChildrenIndex::new();
        children.insert("/".to_string(), vec![leaf("/a")]);
        children.insert("/a".to_string(), Vec::new());
        TreeIndex::new(vec![root], children)
    }

    fn store_ready(cache: &DiffCache, fs_diffs: Vec<Diff>) {
        cache.store_filesystem(&diffs(fs_diffs)).unwrap();
        cache.store_tree(&small_index()).unwrap();
    }

    #[test]
    fn store_then_load_all_round_trips() {
        let (_dir, cache) = cache();
        let fs_diffs = diffs(vec![
            fs_diff("/", true),
            fs_diff("/etc", true),
            fs_diff("/etc/hosts", false),
            fs_diff("/etc/ssh", true),
            fs_diff("/etc/ssh/sshd_config", false),
        ]);
        let proc_diffs = diffs(vec![
            process_diff("4", "System-4", None),
            process_diff("1234", "svc host.exe-1234", Some("4")),
        ]);

        cache.store_filesystem(&fs_diffs).unwrap();
        cache.store_processes(&proc_diffs).unwrap();
        cache.store_tree(&small_index()).unwrap();

        let loaded = cache.load_all().unwrap();
        let mut expected = fs_diffs.clone();
        expected.extend(proc_diffs);
        assert_eq!(loaded, expected);
    }

    #[test]
    fn process_parent_and_title_survive_reload() {
        let (_dir, cache) = cache();
        let original = process_diff("77", "old name.exe-77", Some("4"));
        cache.store_processes(&diffs(vec![original.clone()])).unwrap();
        cache.store_tree(&small_index()).unwrap();

        let loaded = cache.get_diff("77").unwrap().unwrap();
        assert_eq!(loaded.parent_key.as_deref(), Some("4"));
        assert_eq!(loaded.title, "old name.exe-77");
        assert_eq!(loaded, original);
    }

    #[test]
    fn directory_body_uses_sentinel_file() {
        let (_dir, cache) = cache();
        store_ready(&cache, vec![fs_diff("/var/log", true)]);
        let sentinel = cache.layout().disk_dir().join("var/log").join(SENTINEL_FILE);
        assert!(sentinel.is_file());

        let diff = cache.get_diff("/var/log").unwrap().unwrap();
        assert!(diff.is_directory);
        assert_eq!(diff.title, "log");
        assert_eq!(diff.lines_added, 1);
    }

    #[test]
    fn get_diff_dispatches_on_key_shape() {
        let (_dir, cache) = cache();
        cache
            .store_filesystem(&diffs(vec![fs_diff("/tmp/x", false)]))
            .unwrap();
        cache
            .store_processes(&diffs(vec![process_diff("77", "cmd.exe-77", None)]))
            .unwrap();
        cache.store_tree(&small_index()).unwrap();

        let file = cache.get_diff("/tmp/x").unwrap().unwrap();
        assert!(!file.is_directory);
        let process = cache.get_diff("77").unwrap().unwrap();
        assert_eq!(process.status, DiffStatus::Added);
        assert_eq!(process.title, "cmd.exe-77");

        assert!(cache.get_diff("/tmp/missing").unwrap().is_none());
        assert!(cache.get_diff("78").unwrap().is_none());
        assert!(cache.get_diff("Processes").unwrap().is_none());
    }

    #[test]
    fn get_diff_refuses_unfinished_cache() {
        let (_dir, cache) = cache();
        cache
            .store_filesystem(&diffs(vec![fs_diff("/tmp/x", false)]))
            .unwrap();
        assert!(matches!(
            cache.get_diff("/tmp/x"),
            Err(CacheError::NotReady { .. })
        ));
    }

    #[test]
    fn windows_keys_are_stored_as_posix() {
        let (_dir, cache) = cache();
        store_ready(&cache, vec![fs_diff("/Windows/win.ini", false)]);
        assert!(cache.get_diff("\\Windows\\win.ini").unwrap().is_some());
    }

    #[test]
    fn escaping_keys_are_rejected() {
        let (_dir, cache) = cache();
        let err = cache
            .store_filesystem(&diffs(vec![fs_diff("/etc/../../outside", false)]))
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey(_)));

        store_ready(&cache, Vec::new());
        assert!(matches!(cache.get_diff("/a/./b"), Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn file_turned_directory_is_renamed_aside() {
        let (_dir, cache) = cache();
        cache
            .store_filesystem(&diffs(vec![fs_diff("/opt/app", false)]))
            .unwrap();
        store_ready(&cache, vec![fs_diff("/opt/app/bin", false)]);

        let opt = cache.layout().disk_dir().join("opt");
        assert!(opt.join("app").is_dir());
        assert!(opt.join(format!("app{RENAMED_SUFFIX}")).is_file());
        assert!(cache.get_diff("/opt/app/bin").unwrap().is_some());
        assert!(cache.get_diff("/opt/app").unwrap().is_none());
    }

    #[test]
    fn directory_turned_file_is_renamed_aside() {
        let (_dir, cache) = cache();
        cache
            .store_filesystem(&diffs(vec![fs_diff("/srv/data/a", false)]))
            .unwrap();
        cache
            .store_filesystem(&diffs(vec![fs_diff("/srv/data", false)]))
            .unwrap();
        store_ready(&cache, vec![fs_diff("/srv/data/b", false)]);

        let srv = cache.layout().disk_dir().join("srv");
        assert!(srv.join(format!("data{RENAMED_SUFFIX}")).join("a").is_file());
        assert!(srv.join(format!("data{RENAMED_SUFFIX}1")).is_file());
        assert!(srv.join("data").join("b").is_file());

        let loaded = cache.load_all().unwrap();
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["/srv/data/b"]);
    }

    #[test]
    fn restore_with_fewer_keys_drops_stale_bodies() {
        let (_dir, cache) = cache();
        store_ready(&cache, vec![fs_diff("/a", false), fs_diff("/b", false)]);
        assert!(cache.is_ready());

        cache
            .store_filesystem(&diffs(vec![fs_diff("/a", false)]))
            .unwrap();
        assert!(!cache.is_ready());

        cache.store_tree(&small_index()).unwrap();
        let loaded = cache.load_all().unwrap();
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["/a"]);
        assert!(cache.get_diff("/b").unwrap().is_none());
    }

    #[test]
    fn restore_with_fewer_processes_drops_stale_bodies() {
        let (_dir, cache) = cache();
        cache
            .store_processes(&diffs(vec![
                process_diff("4", "System-4", None),
                process_diff("77", "cmd.exe-77", Some("4")),
            ]))
            .unwrap();
        cache.store_tree(&small_index()).unwrap();

        cache
            .store_processes(&diffs(vec![process_diff("4", "System-4", None)]))
            .unwrap();
        assert!(!cache.is_ready());
        cache.store_tree(&small_index()).unwrap();

        let loaded = cache.load_all().unwrap();
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["4"]);
    }

    #[test]
    fn storing_bodies_drops_the_export() {
        let (_dir, cache) = cache();
        store_ready(&cache, vec![fs_diff("/a", false)]);
        let api = cache.layout().api_dir();
        fs::create_dir_all(&api).unwrap();
        fs::write(api.join("changed_files"), "[]").unwrap();

        cache.store_filesystem(&BTreeMap::new()).unwrap();
        assert!(!api.exists());
    }

    #[test]
    fn readiness_requires_bodies_and_tree() {
        let (_dir, cache) = cache();
        assert!(!cache.is_ready());
        assert!(matches!(cache.load_all(), Err(CacheError::NotReady { .. })));

        cache.store_filesystem(&BTreeMap::new()).unwrap();
        assert!(!cache.is_ready());

        cache.store_tree(&small_index()).unwrap();
        assert!(cache.is_ready());
        assert!(cache
            .wait_until_ready(Duration::from_millis(1), Duration::from_millis(10))
            .is_ok());
    }

    #[test]
    fn wait_times_out_when_never_ready() {
        let (_dir, cache) = cache();
        let err = cache
            .wait_until_ready(Duration::from_millis(2), Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, CacheError::NotReady { .. }));
    }

    #[test]
    fn tree_index_round_trips() {
        let (_dir, cache) = cache();
        cache.store_processes(&BTreeMap::new()).unwrap();
        let index = small_index();
        cache.store_tree(&index).unwrap();

        assert_eq!(cache.load_tree_index().unwrap(), index);
        assert_eq!(cache.forest().unwrap(), index.forest);
        assert_eq!(cache.children("/").unwrap(), vec![leaf("/a")]);
        assert!(cache.children("/nope").unwrap().is_empty());
    }

    #[test]
    fn invalid_process_key_rejected_before_writing() {
        let (_dir, cache) = cache();
        store_ready(&cache, Vec::new());
        let bad = diffs(vec![process_diff("/etc", "etc", None)]);
        assert!(matches!(
            cache.store_processes(&bad),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(cache.is_ready());
    }
}
