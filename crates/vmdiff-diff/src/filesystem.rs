//! Filesystem differ: compares two path → entry maps.
//!
//! A key's diff is built from up to four independent sub-diffs (stat
//! attributes, timestamps, extended attributes, content). Each metadata
//! sub-diff becomes one hunk whose `@@` header is tagged with its category;
//! the content sub-diff keeps its own hunks. The merged body is
//!
//! ```text
//! diff --git /etc/hosts /etc/hosts
//! [new file mode 100644 | deleted file mode 100644]
//! --- /etc/hosts
//! +++ /etc/hosts
//! @@ -1,4 +1,4 @@ stat attributes
//! ...
//! @@ -3 +3 @@
//! -127.0.0.1 old
//! +127.0.0.1 new
//! ```

use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};
use vmdiff_types::entry::format_mode;
use vmdiff_types::key::{file_name, normalize_path};
use vmdiff_types::{Diff, FileEntry};

use crate::content::{content_lines, hash_entry, is_binary, MAX_DIFF_SIZE};
use crate::line_diff::{unified_diff, Context};
use crate::options::DiffOptions;
use crate::traits::{EntityDiffer, EntitySpace};
use crate::unified::UnifiedDiff;

const STAT_HUNK: &str = "stat attributes";
const TIMES_HUNK: &str = "file times";
const ATTRIBUTES_HUNK: &str = "extended file attributes";

const UNKNOWN: &str = "<unknown>";

/// Diffs two filesystem snapshots given as path → entry maps.
pub struct FileSystemDiffer<E: FileEntry> {
    before: BTreeMap<String, E>,
    after: BTreeMap<String, E>,
    options: DiffOptions,
    changed: OnceCell<BTreeSet<String>>,
    memo: HashMap<String, Option<Diff>>,
}

impl<E: FileEntry> FileSystemDiffer<E> {
    /// Create a differ. Keys are normalized to absolute POSIX paths.
    pub fn new<B, A>(before: B, after: A, options: DiffOptions) -> Self
    where
        B: IntoIterator<Item = (String, E)>,
        A: IntoIterator<Item = (String, E)>,
    {
        Self {
            before: normalized(before),
            after: normalized(after),
            options,
            changed: OnceCell::new(),
            memo: HashMap::new(),
        }
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    pub fn before(&self) -> &BTreeMap<String, E> {
        &self.before
    }

    pub fn after(&self) -> &BTreeMap<String, E> {
        &self.after
    }

    fn scan(&self) -> BTreeSet<String> {
        let added: Vec<&String> = self
            .after
            .keys()
            .filter(|k| !self.before.contains_key(*k))
            .collect();
        let deleted: Vec<&String> = self
            .before
            .keys()
            .filter(|k| !self.after.contains_key(*k))
            .collect();

        let mut changed = BTreeSet::new();
        if !self.options.only_changed_files {
            changed.extend(added.iter().map(|k| k.to_string()));
            changed.extend(deleted.iter().map(|k| k.to_string()));
        }

        let mut both = 0usize;
        for (key, a) in &self.before {
            let Some(b) = self.after.get(key) else {
                continue;
            };
            both += 1;
            if !self.equal(key, a, b) {
                changed.insert(key.clone());
            }
        }

        info!(
            before = self.before.len(),
            after = self.after.len(),
            both,
            added = added.len(),
            deleted = deleted.len(),
            changed = changed.len(),
            "scanned filesystem snapshots"
        );
        changed
    }

    /// Short-circuit equality: size, stat, times, attributes, then digests.
    ///
    /// Same-size files within the diff ceiling are compared by content
    /// whenever contents are diffed.
    fn equal(&self, key: &str, a: &E, b: &E) -> bool {
        if a.size() != b.size() {
            return false;
        }
        if self.options.use_stat && a.stat() != b.stat() {
            return false;
        }
        if self.options.use_times && a.timestamps() != b.timestamps() {
            return false;
        }
        if self.options.use_attributes && a.extended_attributes() != b.extended_attributes() {
            return false;
        }
        let diffable = self.options.use_contents
            && a.is_file()
            && b.is_file()
            && a.size() <= MAX_DIFF_SIZE;
        if (self.options.use_hashes || diffable) && hash_entry(a, key) != hash_entry(b, key) {
            return false;
        }
        true
    }

    fn should_ignore(&self, key: &str, a: Option<&E>, b: Option<&E>) -> bool {
        let sides = || a.into_iter().chain(b);
        if self.options.ignore_directories && sides().any(|e| e.is_directory()) {
            info!(key, "ignoring directory");
            return true;
        }
        if self.options.ignore_binary && sides().any(|e| is_binary(e, key)) {
            info!(key, "ignoring binary");
            return true;
        }
        false
    }

    fn compute(&self, key: &str) -> Option<Diff> {
        let a = self.before.get(key);
        let b = self.after.get(key);
        let entity = b.or(a)?;

        if self.should_ignore(key, a, b) {
            return None;
        }

        let metadata = |lines: fn(Option<&E>) -> Vec<String>| {
            unified_diff(&lines(a), &lines(b), key, key, Context::Full)
        };
        let stat_diff = if self.options.use_stat {
            metadata(stat_lines)
        } else {
            Vec::new()
        };
        let times_diff = if self.options.show_times {
            metadata(time_lines)
        } else {
            Vec::new()
        };
        let attribute_diff = if self.options.use_attributes {
            metadata(attribute_lines)
        } else {
            Vec::new()
        };
        let has_contents = a.is_some_and(|e| e.is_file()) || b.is_some_and(|e| e.is_file());
        let content_diff = if self.options.use_contents && has_contents {
            self.content_diff(key, a, b)
        } else {
            Vec::new()
        };

        if stat_diff.is_empty()
            && times_diff.is_empty()
            && attribute_diff.is_empty()
            && content_diff.is_empty()
        {
            debug!(key, "no observable difference");
            return None;
        }

        if self.options.ignore_contents_unchanged && content_diff.is_empty() && !entity.is_directory() {
            debug!(key, "ignoring metadata-only change");
            return None;
        }

        let mut body = vec![format!("diff --git {key} {key}")];
        match (a, b) {
            (None, Some(added)) => body.push(format!("new file mode {}", octal_mode(added))),
            (Some(removed), None) => body.push(format!("deleted file mode {}", octal_mode(removed))),
            _ => {}
        }
        body.extend(merge_sub_diffs(
            &stat_diff,
            &times_diff,
            &attribute_diff,
            &content_diff,
        ));

        Some(UnifiedDiff::new(body).into_diff(key, entity.is_directory(), file_name(key), None))
    }

    fn content_diff(&self, key: &str, a: Option<&E>, b: Option<&E>) -> Vec<String> {
        let oversized = |e: &E| e.size() > MAX_DIFF_SIZE;
        if a.is_some_and(oversized) || b.is_some_and(oversized) {
            let size = b.or(a).map_or(0, |e| e.size());
            info!(key, size, "file too large to diff");
            return placeholder(key, &format!("File too large to diff ({size} bytes)"));
        }

        let a_binary = a.is_some_and(|e| is_binary(e, key));
        let b_binary = b.is_some_and(|e| is_binary(e, key));
        let all_binary = a.map_or(true, |_| a_binary) && b.map_or(true, |_| b_binary);

        if all_binary {
            let a_hash = a.and_then(|e| hash_entry(e, key));
            let b_hash = b.and_then(|e| hash_entry(e, key));
            if a_hash == b_hash {
                return Vec::new();
            }
            return placeholder(key, "Binary files differ");
        }

        let old = a.map_or_else(Vec::new, |e| content_lines(e, key, a_binary));
        let new = b.map_or_else(Vec::new, |e| content_lines(e, key, b_binary));
        unified_diff(&old, &new, key, key, Context::Lines(self.options.context_lines))
    }
}

impl<E: FileEntry> EntityDiffer for FileSystemDiffer<E> {
    fn space(&self) -> EntitySpace {
        EntitySpace::FileSystem
    }

    fn list_changed_keys(&self) -> &BTreeSet<String> {
        self.changed.get_or_init(|| self.scan())
    }

    fn diff(&mut self, key: &str) -> Option<Diff> {
        let key = normalize_path(key);
        if let Some(hit) = self.memo.get(&key) {
            return hit.clone();
        }
        let result = self.compute(&key);
        self.memo.insert(key, result.clone());
        result
    }
}

fn normalized<E>(entries: impl IntoIterator<Item = (String, E)>) -> BTreeMap<String, E> {
    entries
        .into_iter()
        .map(|(key, entry)| (normalize_path(&key), entry))
        .collect()
}

/// Combine sub-diffs under one pair of path headers.
///
/// Metadata sub-diffs are single full-context hunks; their `@@` line gets the
/// category appended. Content hunks follow unchanged.
fn merge_sub_diffs(
    stat: &[String],
    times: &[String],
    attributes: &[String],
    content: &[String],
) -> Vec<String> {
    let headers = [stat, times, attributes, content]
        .into_iter()
        .find(|d| d.len() >= 2)
        .map(|d| d[..2].to_vec())
        .unwrap_or_default();

    let mut merged = headers;
    for (diff, name) in [(stat, STAT_HUNK), (times, TIMES_HUNK), (attributes, ATTRIBUTES_HUNK)] {
        if let Some((hunk_header, lines)) = diff.get(2..).and_then(|rest| rest.split_first()) {
            merged.push(format!("{hunk_header} {name}"));
            merged.extend(lines.iter().cloned());
        }
    }
    if let Some(hunks) = content.get(2..) {
        merged.extend(hunks.iter().cloned());
    }
    merged
}

fn placeholder(key: &str, message: &str) -> Vec<String> {
    vec![
        format!("--- {key}"),
        format!("+++ {key}"),
        "@@ -0,0 +0,0 @@".to_string(),
        format!(" {message}"),
    ]
}

fn octal_mode<E: FileEntry>(entry: &E) -> String {
    entry
        .stat()
        .mode
        .map_or_else(|| UNKNOWN.to_string(), |mode| format!("{mode:o}"))
}

fn display_id(id: Option<u32>) -> String {
    id.map_or_else(|| UNKNOWN.to_string(), |id| id.to_string())
}

fn stat_lines<E: FileEntry>(entry: Option<&E>) -> Vec<String> {
    let Some(entry) = entry else {
        return Vec::new();
    };
    let stat = entry.stat();
    vec![
        format!("type: {}", stat.kind),
        format!("owner_identifier: {}", display_id(stat.owner_id)),
        format!("group_identifier: {}", display_id(stat.group_id)),
        format!(
            "mode: {}",
            stat.mode.map_or_else(|| UNKNOWN.to_string(), format_mode)
        ),
    ]
}

fn time_lines<E: FileEntry>(entry: Option<&E>) -> Vec<String> {
    let Some(entry) = entry else {
        return Vec::new();
    };
    let times = entry.timestamps();
    let show = |t: Option<DateTime<Utc>>| {
        t.map_or_else(
            || UNKNOWN.to_string(),
            |t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        )
    };
    vec![
        format!("access_time: {}", show(times.access)),
        format!("added_time: {}", show(times.added)),
        format!("change_time: {}", show(times.change)),
        format!("creation_time: {}", show(times.creation)),
        format!("modification_time: {}", show(times.modification)),
    ]
}

/// One `name: value` line per attribute with a non-empty value.
fn attribute_lines<E: FileEntry>(entry: Option<&E>) -> Vec<String> {
    let Some(entry) = entry else {
        return Vec::new();
    };
    entry
        .extended_attributes()
        .into_iter()
        .filter(|attr| !attr.value.is_empty())
        .map(|attr| format!("{}: {}", attr.name, String::from_utf8_lossy(&attr.value)))
        .collect()
}
