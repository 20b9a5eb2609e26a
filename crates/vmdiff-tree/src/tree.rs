//! Tree construction over both entity spaces.
//!
//! Building is two-phase. Phase one creates a draft per key (synthesizing
//! missing filesystem ancestors and the process root), resolves each draft's
//! parent and links keys into child lists in ascending key order. Phase two
//! folds the linked structure bottom-up into final [`Node`]s carrying leaf
//! flags and descendant counts.
//!
//! # Invariants
//!
//! - Exactly one node per entity space has itself as parent (the root).
//! - Every other node appears in exactly one parent's child list.
//! - `is_leaf` holds exactly when a node has no children.
//! - `num_direct_children` counts non-directory children; `num_children`
//!   counts non-directory descendants.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{info, warn};
use vmdiff_diff::{EntityDiffer, EntitySpace};
use vmdiff_types::key::{ancestors, file_name, parent_path, PROCESS_ROOT_KEY};
use vmdiff_types::{ChildrenIndex, Diff, DiffStatus, Forest, Node, TreeIndex};

use crate::error::{TreeError, TreeResult};

/// A node before fix-up, plus the key of its parent.
struct Draft {
    node: Node,
    parent: String,
}

impl Draft {
    fn new(key: &str, title: &str, is_directory: bool, status: DiffStatus, parent: String) -> Self {
        Self {
            node: Node {
                key: key.to_string(),
                title: title.to_string(),
                is_leaf: false,
                is_directory,
                status,
                lines_added: 0,
                lines_removed: 0,
                num_children: 0,
                num_direct_children: 0,
            },
            parent,
        }
    }

    /// An unchanged directory standing in for a key with no diff.
    fn placeholder(key: &str) -> Self {
        Self::new(key, file_name(key), true, DiffStatus::Unchanged, parent_path(key).to_string())
    }

    fn from_diff(key: &str, diff: &Diff, fallback_title: &str, parent: String) -> Self {
        let title = if diff.title.is_empty() {
            fallback_title
        } else {
            diff.title.as_str()
        };
        let mut draft = Self::new(key, title, diff.is_directory, diff.status, parent);
        draft.node.lines_added = diff.lines_added;
        draft.node.lines_removed = diff.lines_removed;
        draft
    }
}

fn filesystem_drafts(diffs: &BTreeMap<String, Diff>) -> BTreeMap<String, Draft> {
    let mut drafts = BTreeMap::new();
    for (key, diff) in diffs {
        for ancestor in ancestors(key) {
            drafts
                .entry(ancestor.to_string())
                .or_insert_with(|| Draft::placeholder(ancestor));
        }
        let draft = Draft::from_diff(key, diff, file_name(key), parent_path(key).to_string());
        drafts.insert(key.clone(), draft);
    }
    drafts
}

fn process_drafts(diffs: &BTreeMap<String, Diff>) -> BTreeMap<String, Draft> {
    let mut drafts = BTreeMap::new();
    drafts.insert(
        PROCESS_ROOT_KEY.to_string(),
        Draft::new(
            PROCESS_ROOT_KEY,
            PROCESS_ROOT_KEY,
            false,
            DiffStatus::Modified,
            PROCESS_ROOT_KEY.to_string(),
        ),
    );
    for (key, diff) in diffs {
        let parent = diff
            .parent_key
            .as_ref()
            .filter(|p| *p != key && diffs.contains_key(p.as_str()))
            .cloned()
            .unwrap_or_else(|| PROCESS_ROOT_KEY.to_string());
        drafts.insert(key.clone(), Draft::from_diff(key, diff, key, parent));
    }
    cut_cycles(&mut drafts, PROCESS_ROOT_KEY);
    drafts
}

/// Re-parent onto `root` the first node found to close a parent loop.
///
/// Walks start in ascending key order, so the cut point is deterministic.
fn cut_cycles(drafts: &mut BTreeMap<String, Draft>, root: &str) {
    let starts: Vec<String> = drafts.keys().cloned().collect();
    let mut settled: HashSet<String> = HashSet::from([root.to_string()]);

    for start in starts {
        let mut path: Vec<String> = Vec::new();
        let mut current = start;
        while !settled.contains(&current) {
            if path.contains(&current) {
                warn!(key = %current, "parent cycle detected; attaching to root");
                if let Some(draft) = drafts.get_mut(&current) {
                    draft.parent = root.to_string();
                }
                break;
            }
            let Some(draft) = drafts.get(&current) else {
                break;
            };
            path.push(current);
            current = draft.parent.clone();
        }
        settled.extend(path);
    }
}

/// Phase one output: roots, child key lists and unfinished nodes.
struct Linked {
    roots: Vec<String>,
    children: BTreeMap<String, Vec<String>>,
    nodes: BTreeMap<String, Node>,
}

fn link(drafts: BTreeMap<String, Draft>) -> Linked {
    let mut roots = Vec::new();
    let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut nodes = BTreeMap::new();

    for key in drafts.keys() {
        children.insert(key.clone(), Vec::new());
    }
    for (key, draft) in drafts {
        if draft.parent == key {
            roots.push(key.clone());
        } else if let Some(siblings) = children.get_mut(&draft.parent) {
            siblings.push(key.clone());
        } else {
            warn!(key = %key, parent = %draft.parent, "parent missing; promoting to root");
            roots.push(key.clone());
        }
        nodes.insert(key, draft.node);
    }

    Linked {
        roots,
        children,
        nodes,
    }
}

/// Phase two: post-order fold assigning leaf flags and counts.
fn fold(linked: Linked) -> TreeIndex {
    let Linked {
        roots,
        children,
        mut nodes,
    } = linked;

    let mut preorder: Vec<&str> = Vec::with_capacity(nodes.len());
    let mut stack: Vec<&str> = roots.iter().rev().map(String::as_str).collect();
    while let Some(key) = stack.pop() {
        preorder.push(key);
        if let Some(kids) = children.get(key) {
            stack.extend(kids.iter().rev().map(String::as_str));
        }
    }

    // key -> (num_children, num_direct_children)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::with_capacity(preorder.len());
    for &key in preorder.iter().rev() {
        let mut total = 0;
        let mut direct = 0;
        for child in children.get(key).into_iter().flatten() {
            if nodes.get(child).is_some_and(|n| !n.is_directory) {
                total += 1;
                direct += 1;
            }
            total += counts.get(child.as_str()).map_or(0, |c| c.0);
        }
        counts.insert(key, (total, direct));
    }

    for (key, node) in nodes.iter_mut() {
        let (total, direct) = counts.get(key.as_str()).copied().unwrap_or_default();
        node.is_leaf = children.get(key).map_or(true, Vec::is_empty);
        node.num_children = total;
        node.num_direct_children = direct;
    }

    let lookup = |key: &String| nodes.get(key).cloned();
    let forest: Forest = roots.iter().filter_map(lookup).collect();
    let index: ChildrenIndex = children
        .iter()
        .map(|(key, kids)| (key.clone(), kids.iter().filter_map(lookup).collect()))
        .collect();
    TreeIndex::new(forest, index)
}

/// Assemble a tree index from the diffs of one entity space.
///
/// An empty diff map yields an empty index.
pub fn assemble(space: EntitySpace, diffs: &BTreeMap<String, Diff>) -> TreeIndex {
    if diffs.is_empty() {
        return TreeIndex::default();
    }
    let drafts = match space {
        EntitySpace::FileSystem => filesystem_drafts(diffs),
        EntitySpace::Process => process_drafts(diffs),
    };
    fold(link(drafts))
}

/// A diff tree: built once from a differ, then queried or merged.
#[derive(Clone, Debug, Default)]
pub struct DiffTree {
    index: Option<TreeIndex>,
}

impl DiffTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already-built index, e.g. one loaded from a cache.
    pub fn from_index(index: TreeIndex) -> Self {
        Self { index: Some(index) }
    }

    /// Build from `differ`, or return the index built by an earlier call.
    pub fn build(&mut self, differ: &mut dyn EntityDiffer) -> &TreeIndex {
        self.index.get_or_insert_with(|| {
            let diffs = differ.diff_all();
            let index = assemble(differ.space(), &diffs);
            info!(
                space = ?differ.space(),
                diffs = diffs.len(),
                nodes = index.len(),
                "built diff tree"
            );
            index
        })
    }

    pub fn is_built(&self) -> bool {
        self.index.is_some()
    }

    pub fn index(&self) -> Option<&TreeIndex> {
        self.index.as_ref()
    }

    pub fn forest(&self) -> &[Node] {
        self.index
            .as_ref()
            .map(|i| i.forest.as_slice())
            .unwrap_or(&[])
    }

    pub fn children(&self, key: &str) -> &[Node] {
        self.index
            .as_ref()
            .map(|i| i.children_of(key))
            .unwrap_or(&[])
    }

    pub fn into_index(self) -> TreeIndex {
        self.index.unwrap_or_default()
    }

    /// Combine two independently built trees.
    ///
    /// Returns [`TreeError::KeyCollision`] if any key exists in both.
    pub fn merge(self, other: DiffTree) -> TreeResult<DiffTree> {
        let mut merged = self.into_index();
        let other = other.into_index();

        let theirs = other
            .forest
            .iter()
            .map(|n| &n.key)
            .chain(other.children.keys());
        for key in theirs {
            if merged.children.contains_key(key) || merged.forest.iter().any(|n| &n.key == key) {
                return Err(TreeError::KeyCollision(key.clone()));
            }
        }

        merged.forest.extend(other.forest);
        merged.children.extend(other.children);
        Ok(Self::from_index(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn file_diff(key: &str, status: DiffStatus) -> Diff {
        Diff {
            key: key.to_string(),
            status,
            is_directory: false,
            lines_added: 2,
            lines_removed: 1,
            body: vec![format!("diff --git {key} {key}")],
            title: file_name(key).to_string(),
            parent_key: None,
        }
    }

    fn process_diff(pid: &str, parent: Option<&str>) -> Diff {
        Diff {
            key: pid.to_string(),
            status: DiffStatus::Added,
            is_directory: false,
            lines_added: 3,
            lines_removed: 0,
            body: Vec::new(),
            title: format!("proc.exe-{pid}"),
            parent_key: parent.map(str::to_string),
        }
    }

    fn diffs(items: Vec<Diff>) -> BTreeMap<String, Diff> {
        items.into_iter().map(|d| (d.key.clone(), d)).collect()
    }

    fn child_keys(index: &TreeIndex, key: &str) -> Vec<String> {
        index.children_of(key).iter().map(|n| n.key.clone()).collect()
    }

    /// Differ over a fixed diff map.
    struct Fixed {
        space: EntitySpace,
        keys: BTreeSet<String>,
        diffs: BTreeMap<String, Diff>,
        calls: usize,
    }

    impl EntityDiffer for Fixed {
        fn space(&self) -> EntitySpace {
            self.space
        }

        fn list_changed_keys(&self) -> &BTreeSet<String> {
            &self.keys
        }

        fn diff(&mut self, key: &str) -> Option<Diff> {
            self.calls += 1;
            self.diffs.get(key).cloned()
        }
    }

    fn fixed(space: EntitySpace, items: Vec<Diff>) -> Fixed {
        let diffs = diffs(items);
        Fixed {
            space,
            keys: diffs.keys().cloned().collect(),
            diffs,
            calls: 0,
        }
    }

    #[test]
    fn single_file_synthesizes_ancestors() {
        let index = assemble(
            EntitySpace::FileSystem,
            &diffs(vec![file_diff("/a/b.txt", DiffStatus::Modified)]),
        );

        assert_eq!(index.forest.len(), 1);
        let root = &index.forest[0];
        assert_eq!(root.key, "/");
        assert_eq!(root.title, "/");
        assert_eq!(root.num_children, 1);
        assert_eq!(root.num_direct_children, 0);
        assert!(!root.is_leaf);

        assert_eq!(child_keys(&index, "/"), vec!["/a"]);
        let a = &index.children_of("/")[0];
        assert_eq!(a.status, DiffStatus::Unchanged);
        assert!(a.is_directory);
        assert_eq!(a.num_direct_children, 1);

        let leaf = &index.children_of("/a")[0];
        assert_eq!(leaf.key, "/a/b.txt");
        assert!(leaf.is_leaf);
        assert_eq!(leaf.lines_added, 2);
        assert!(index.children_of("/a/b.txt").is_empty());
        assert!(index.children.contains_key("/a/b.txt"));
    }

    #[test]
    fn children_sorted_and_directories_not_counted() {
        let mut dir = file_diff("/etc/ssh", DiffStatus::Added);
        dir.is_directory = true;
        let index = assemble(
            EntitySpace::FileSystem,
            &diffs(vec![
                file_diff("/etc/passwd", DiffStatus::Modified),
                file_diff("/etc/hosts", DiffStatus::Modified),
                dir,
                file_diff("/etc/ssh/sshd_config", DiffStatus::Added),
            ]),
        );

        assert_eq!(
            child_keys(&index, "/etc"),
            vec!["/etc/hosts", "/etc/passwd", "/etc/ssh"]
        );
        let etc = &index.children_of("/")[0];
        assert_eq!(etc.num_direct_children, 2);
        assert_eq!(etc.num_children, 3);
        let ssh = index.find("/etc/ssh").unwrap();
        assert!(ssh.is_directory);
        assert!(!ssh.is_leaf);
        assert_eq!(ssh.status, DiffStatus::Added);
    }

    #[test]
    fn empty_directory_diff_is_leaf() {
        let mut dir = file_diff("/tmp/empty", DiffStatus::Added);
        dir.is_directory = true;
        let index = assemble(EntitySpace::FileSystem, &diffs(vec![dir]));
        let node = index.find("/tmp/empty").unwrap();
        assert!(node.is_leaf);
        assert_eq!(index.forest[0].num_children, 0);
    }

    #[test]
    fn empty_diffs_give_empty_tree() {
        assert!(assemble(EntitySpace::FileSystem, &BTreeMap::new()).is_empty());
        assert!(assemble(EntitySpace::Process, &BTreeMap::new()).is_empty());
    }

    #[test]
    fn processes_hang_off_synthetic_root() {
        let index = assemble(
            EntitySpace::Process,
            &diffs(vec![
                process_diff("100", Some("4")),
                process_diff("200", Some("100")),
                process_diff("300", None),
            ]),
        );

        assert_eq!(index.forest.len(), 1);
        let root = &index.forest[0];
        assert_eq!(root.key, PROCESS_ROOT_KEY);
        assert_eq!(root.title, PROCESS_ROOT_KEY);
        assert_eq!(root.status, DiffStatus::Modified);
        assert!(!root.is_directory);
        assert_eq!(root.num_children, 3);
        assert_eq!(root.num_direct_children, 2);

        assert_eq!(child_keys(&index, PROCESS_ROOT_KEY), vec!["100", "300"]);
        assert_eq!(child_keys(&index, "100"), vec!["200"]);
        assert_eq!(index.find("200").unwrap().title, "proc.exe-200");
    }

    #[test]
    fn self_parent_and_cycles_attach_to_root() {
        let index = assemble(
            EntitySpace::Process,
            &diffs(vec![
                process_diff("1", Some("1")),
                process_diff("2", Some("3")),
                process_diff("3", Some("2")),
            ]),
        );
        let roots = child_keys(&index, PROCESS_ROOT_KEY);
        assert!(roots.contains(&"1".to_string()));
        assert_eq!(index.len(), 4);
        assert_eq!(index.forest[0].num_children, 3);
    }

    #[test]
    fn build_is_idempotent() {
        let mut differ = fixed(
            EntitySpace::FileSystem,
            vec![
                file_diff("/x/y", DiffStatus::Added),
                file_diff("/z", DiffStatus::Removed),
            ],
        );
        let mut tree = DiffTree::new();
        let first = tree.build(&mut differ).clone();
        let calls = differ.calls;
        let second = tree.build(&mut differ).clone();
        assert_eq!(first, second);
        assert_eq!(differ.calls, calls);
        assert_eq!(tree.forest().len(), 1);
        assert_eq!(tree.children("/x").len(), 1);
    }

    #[test]
    fn merge_combines_disjoint_trees() {
        let mut fs = DiffTree::new();
        fs.build(&mut fixed(
            EntitySpace::FileSystem,
            vec![file_diff("/a", DiffStatus::Added)],
        ));
        let mut procs = DiffTree::new();
        procs.build(&mut fixed(EntitySpace::Process, vec![process_diff("42", None)]));

        let merged = fs.merge(procs).unwrap();
        let roots: Vec<&str> = merged.forest().iter().map(|n| n.key.as_str()).collect();
        assert_eq!(roots, vec!["/", PROCESS_ROOT_KEY]);
        assert_eq!(merged.children(PROCESS_ROOT_KEY).len(), 1);
        assert_eq!(merged.children("/").len(), 1);
    }

    #[test]
    fn merge_rejects_overlapping_keys() {
        let build = || {
            let mut tree = DiffTree::new();
            tree.build(&mut fixed(
                EntitySpace::FileSystem,
                vec![file_diff("/a", DiffStatus::Added)],
            ));
            tree
        };
        let err = build().merge(build()).unwrap_err();
        assert!(matches!(err, TreeError::KeyCollision(_)));
    }

    #[test]
    fn unbuilt_tree_is_empty() {
        let tree = DiffTree::new();
        assert!(!tree.is_built());
        assert!(tree.forest().is_empty());
        assert!(tree.children("/").is_empty());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn arb_path() -> impl Strategy<Value = String> {
            proptest::collection::vec(prop_oneof!["a", "b", "c", "d"], 1..5)
                .prop_map(|parts| format!("/{}", parts.join("/")))
        }

        fn arb_diffs() -> impl Strategy<Value = BTreeMap<String, Diff>> {
            proptest::collection::btree_map(arb_path(), any::<bool>(), 1..24).prop_map(|paths| {
                paths
                    .into_iter()
                    .map(|(path, is_directory)| {
                        let mut diff = file_diff(&path, DiffStatus::Modified);
                        diff.is_directory = is_directory;
                        (path, diff)
                    })
                    .collect()
            })
        }

        fn descendants(index: &TreeIndex, key: &str) -> usize {
            index
                .children_of(key)
                .iter()
                .map(|c| usize::from(!c.is_directory) + descendants(index, &c.key))
                .sum()
        }

        proptest! {
            #[test]
            fn counts_and_leaves_are_consistent(diffs in arb_diffs()) {
                let index = assemble(EntitySpace::FileSystem, &diffs);
                prop_assert_eq!(index.forest.len(), 1);

                let nodes: Vec<&Node> = index
                    .forest
                    .iter()
                    .chain(index.children.values().flatten())
                    .collect();
                for node in nodes {
                    let kids = index.children_of(&node.key);
                    prop_assert_eq!(node.is_leaf, kids.is_empty());
                    prop_assert_eq!(
                        node.num_direct_children,
                        kids.iter().filter(|c| !c.is_directory).count()
                    );
                    prop_assert_eq!(node.num_children, descendants(&index, &node.key));
                }
            }

            #[test]
            fn every_node_has_one_parent(diffs in arb_diffs()) {
                let index = assemble(EntitySpace::FileSystem, &diffs);
                let mut seen = BTreeSet::new();
                for kids in index.children.values() {
                    for kid in kids {
                        prop_assert!(seen.insert(kid.key.clone()));
                    }
                }
                prop_assert_eq!(seen.len() + 1, index.children.len());
                for key in diffs.keys() {
                    prop_assert!(seen.contains(key) || key == "/");
                }
            }

            #[test]
            fn assembly_is_deterministic(diffs in arb_diffs()) {
                prop_assert_eq!(
                    assemble(EntitySpace::FileSystem, &diffs),
                    assemble(EntitySpace::FileSystem, &diffs)
                );
            }
        }
    }
}
