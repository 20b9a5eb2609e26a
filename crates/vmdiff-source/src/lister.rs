//! Filesystem snapshot listing.
//!
//! A snapshot is a directory on the host holding a mounted or extracted disk
//! image. [`DirectoryLister`] walks it and keys every entry by its absolute
//! path inside the image, so `<root>/etc/passwd` becomes `/etc/passwd` and the
//! root itself becomes `/`.
//!
//! Listing honours two filters:
//!
//! - **allow dirs**: a path is listed when it lies under an allowed directory
//!   or is an ancestor of one (so the walk can reach it). Defaults to `/`.
//! - **ignore dirs**: regular expressions searched anywhere in the key; a
//!   match prunes the entry and everything below it.

use std::collections::BTreeMap;
use std::fs::{self, File, Metadata};
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};
use vmdiff_types::key::{components, normalize_path, ROOT_PATH};
use vmdiff_types::{EntryKind, ExtendedAttribute, FileEntry, StatAttributes, Timestamps};

use crate::error::SourceResult;

/// Walks a snapshot directory into keyed [`LocalFileEntry`] values.
#[derive(Clone, Debug)]
pub struct DirectoryLister {
    root: PathBuf,
    allow_dirs: Vec<String>,
    ignore_dirs: Vec<Regex>,
}

impl DirectoryLister {
    /// A lister over `root` that lists everything.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allow_dirs: vec![ROOT_PATH.to_string()],
            ignore_dirs: Vec::new(),
        }
    }

    /// Restrict listing to these directories. An empty list keeps the default.
    pub fn with_allow_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dirs: Vec<String> = dirs.into_iter().map(|d| normalize_path(d.as_ref())).collect();
        if !dirs.is_empty() {
            self.allow_dirs = dirs;
        }
        self
    }

    /// Prune every key matching one of these patterns.
    pub fn with_ignore_dirs<I, S>(mut self, patterns: I) -> SourceResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignore_dirs = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `key` passes the allow and ignore filters.
    pub fn should_list(&self, key: &str) -> bool {
        let allowed = self
            .allow_dirs
            .iter()
            .any(|allow| is_within(key, allow) || is_within(allow, key));
        allowed && !self.ignore_dirs.iter().any(|re| re.is_match(key))
    }

    /// List the snapshot.
    ///
    /// Entries that cannot be read are logged and skipped; only a missing or
    /// unreadable root is an error.
    pub fn list(&self) -> SourceResult<BTreeMap<String, LocalFileEntry>> {
        let root_meta = fs::symlink_metadata(&self.root)?;
        let mut entries = BTreeMap::new();
        entries.insert(
            ROOT_PATH.to_string(),
            LocalFileEntry::new(self.root.clone(), root_meta),
        );

        let walker = walkdir::WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| self.key_for(e.path()).is_some_and(|k| self.should_list(&k)));

        for item in walker {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "unable to list entry");
                    continue;
                }
            };
            let Some(key) = self.key_for(entry.path()) else {
                continue;
            };
            match entry.metadata() {
                Ok(meta) => {
                    entries.insert(key, LocalFileEntry::new(entry.into_path(), meta));
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "unable to stat entry");
                }
            }
        }

        info!(root = %self.root.display(), entries = entries.len(), "listed snapshot");
        Ok(entries)
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(format!("/{}", parts.join("/")))
    }
}

/// A file inside a snapshot directory on the host.
#[derive(Clone, Debug)]
pub struct LocalFileEntry {
    path: PathBuf,
    metadata: Metadata,
}

impl LocalFileEntry {
    /// Wrap an already-fetched `symlink_metadata` result.
    pub fn new(path: PathBuf, metadata: Metadata) -> Self {
        Self { path, metadata }
    }

    /// Stat `path` without following a final symlink.
    pub fn open_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let metadata = fs::symlink_metadata(&path)?;
        Ok(Self { path, metadata })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn to_utc(time: io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

#[cfg(unix)]
fn special_kind(ft: &fs::FileType) -> Option<EntryKind> {
    use std::os::unix::fs::FileTypeExt;
    if ft.is_block_device() || ft.is_char_device() {
        Some(EntryKind::Device)
    } else if ft.is_fifo() {
        Some(EntryKind::Pipe)
    } else if ft.is_socket() {
        Some(EntryKind::Socket)
    } else {
        None
    }
}

#[cfg(not(unix))]
fn special_kind(_ft: &fs::FileType) -> Option<EntryKind> {
    None
}

impl FileEntry for LocalFileEntry {
    fn size(&self) -> u64 {
        self.metadata.len()
    }

    fn kind(&self) -> EntryKind {
        let ft = self.metadata.file_type();
        if ft.is_dir() {
            EntryKind::Directory
        } else if ft.is_symlink() {
            EntryKind::Link
        } else if ft.is_file() {
            EntryKind::File
        } else {
            special_kind(&ft).unwrap_or(EntryKind::Unknown)
        }
    }

    fn open(&self) -> io::Result<Option<Box<dyn Read + '_>>> {
        match self.kind() {
            EntryKind::File => {
                debug!(path = %self.path.display(), "opening file");
                Ok(Some(Box::new(BufReader::new(File::open(&self.path)?))))
            }
            // A link's data is its target.
            EntryKind::Link => {
                let target = fs::read_link(&self.path)?;
                let bytes = target.to_string_lossy().into_owned().into_bytes();
                Ok(Some(Box::new(Cursor::new(bytes))))
            }
            _ => Ok(None),
        }
    }

    #[cfg(unix)]
    fn stat(&self) -> StatAttributes {
        use std::os::unix::fs::MetadataExt;
        StatAttributes {
            kind: self.kind(),
            owner_id: Some(self.metadata.uid()),
            group_id: Some(self.metadata.gid()),
            mode: Some(self.metadata.mode()),
        }
    }

    #[cfg(not(unix))]
    fn stat(&self) -> StatAttributes {
        StatAttributes {
            kind: self.kind(),
            owner_id: None,
            group_id: None,
            mode: None,
        }
    }

    fn timestamps(&self) -> Timestamps {
        Timestamps {
            access: to_utc(self.metadata.accessed()),
            added: None,
            change: change_time(&self.metadata),
            creation: to_utc(self.metadata.created()),
            modification: to_utc(self.metadata.modified()),
        }
    }

    // Host listings do not read extended attributes.
    fn extended_attributes(&self) -> Vec<ExtendedAttribute> {
        Vec::new()
    }
}

#[cfg(unix)]
fn change_time(metadata: &Metadata) -> Option<DateTime<Utc>> {
    use std::os::unix::fs::MetadataExt;
    let nanos = u32::try_from(metadata.ctime_nsec()).ok()?;
    DateTime::from_timestamp(metadata.ctime(), nanos)
}

#[cfg(not(unix))]
fn change_time(_metadata: &Metadata) -> Option<DateTime<Utc>> {
    None
}

/// Whether `path` is `dir` or lies below it, compared component-wise.
fn is_within(path: &str, dir: &str) -> bool {
    components(path).starts_with(&components(dir))
}
