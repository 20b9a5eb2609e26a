//! The file entry contract exposed by snapshot traversal code.
//!
//! A traversal library resolves a path inside a captured disk image to an
//! opaque entry. The differ only ever talks to entries through [`FileEntry`],
//! so any backend (a mounted image, a host directory, an in-memory fixture)
//! can feed it.

use std::fmt;
use std::io::{self, Cursor, Read};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type of a file system entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    File,
    Directory,
    Link,
    Device,
    Pipe,
    Socket,
    Unknown,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Link => "link",
            Self::Device => "device",
            Self::Pipe => "pipe",
            Self::Socket => "socket",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership and permission attributes of an entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatAttributes {
    pub kind: EntryKind,
    pub owner_id: Option<u32>,
    pub group_id: Option<u32>,
    /// Full `st_mode`, file type bits included.
    pub mode: Option<u32>,
}

/// The five timestamps a captured file system may record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub access: Option<DateTime<Utc>>,
    pub added: Option<DateTime<Utc>>,
    pub change: Option<DateTime<Utc>>,
    pub creation: Option<DateTime<Utc>>,
    pub modification: Option<DateTime<Utc>>,
}

/// A named extended attribute and its raw value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedAttribute {
    pub name: String,
    pub value: Vec<u8>,
}

impl ExtendedAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One entry in a snapshot, as exposed by a traversal library.
pub trait FileEntry {
    /// Size of the entry's data stream in bytes.
    fn size(&self) -> u64;

    fn kind(&self) -> EntryKind;

    /// Open the entry's data stream.
    ///
    /// Returns `Ok(None)` for entries without data (directories, sockets).
    fn open(&self) -> io::Result<Option<Box<dyn Read + '_>>>;

    fn stat(&self) -> StatAttributes;

    fn timestamps(&self) -> Timestamps;

    fn extended_attributes(&self) -> Vec<ExtendedAttribute>;

    fn is_directory(&self) -> bool {
        self.kind() == EntryKind::Directory
    }

    fn is_file(&self) -> bool {
        self.kind() == EntryKind::File
    }

    fn is_device(&self) -> bool {
        self.kind() == EntryKind::Device
    }

    fn is_pipe(&self) -> bool {
        self.kind() == EntryKind::Pipe
    }

    fn is_socket(&self) -> bool {
        self.kind() == EntryKind::Socket
    }
}

/// Render an `st_mode` the way `ls -l` does, e.g. `-rw-r--r--`.
pub fn format_mode(mode: u32) -> String {
    const S_IFMT: u32 = 0o170000;

    let kind = match mode & S_IFMT {
        0o140000 => 's',
        0o120000 => 'l',
        0o100000 => '-',
        0o060000 => 'b',
        0o040000 => 'd',
        0o020000 => 'c',
        0o010000 => 'p',
        _ => '?',
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    // (read, write, exec, special bit, special char) for user, group, other.
    let triads = [
        (0o400, 0o200, 0o100, 0o4000, 's'),
        (0o040, 0o020, 0o010, 0o2000, 's'),
        (0o004, 0o002, 0o001, 0o1000, 't'),
    ];
    for (r, w, x, special, special_char) in triads {
        out.push(if mode & r != 0 { 'r' } else { '-' });
        out.push(if mode & w != 0 { 'w' } else { '-' });
        let exec = mode & x != 0;
        let special_set = mode & special != 0;
        out.push(match (exec, special_set) {
            (true, true) => special_char,
            (false, true) => special_char.to_ascii_uppercase(),
            (true, false) => 'x',
            (false, false) => '-',
        });
    }
    out
}

/// An in-memory [`FileEntry`].
///
/// Intended for tests and for feeding snapshots that were already extracted
/// into memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryEntry {
    pub kind: EntryKind,
    pub data: Vec<u8>,
    pub owner_id: Option<u32>,
    pub group_id: Option<u32>,
    pub mode: Option<u32>,
    pub timestamps: Timestamps,
    pub xattrs: Vec<ExtendedAttribute>,
    /// When set, every attempt to open the data stream fails.
    pub unreadable: bool,
}

impl MemoryEntry {
    /// A regular file with the given contents and mode `0100644`.
    pub fn file(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: EntryKind::File,
            data: data.into(),
            mode: Some(0o100644),
            ..Default::default()
        }
    }

    /// A directory with mode `040755`.
    pub fn directory() -> Self {
        Self {
            kind: EntryKind::Directory,
            mode: Some(0o040755),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn without_mode(mut self) -> Self {
        self.mode = None;
        self
    }

    pub fn with_owner(mut self, owner_id: u32, group_id: u32) -> Self {
        self.owner_id = Some(owner_id);
        self.group_id = Some(group_id);
        self
    }

    pub fn with_timestamps(mut self, timestamps: Timestamps) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn with_xattr(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.xattrs.push(ExtendedAttribute::new(name, value));
        self
    }

    pub fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }
}

impl FileEntry for MemoryEntry {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn kind(&self) -> EntryKind {
        self.kind
    }

    fn open(&self) -> io::Result<Option<Box<dyn Read + '_>>> {
        if self.unreadable {
            return Err(io::Error::other("entry is unreadable"));
        }
        match self.kind {
            EntryKind::File | EntryKind::Link | EntryKind::Unknown => {
                Ok(Some(Box::new(Cursor::new(self.data.as_slice()))))
            }
            _ => Ok(None),
        }
    }

    fn stat(&self) -> StatAttributes {
        StatAttributes {
            kind: self.kind,
            owner_id: self.owner_id,
            group_id: self.group_id,
            mode: self.mode,
        }
    }

    fn timestamps(&self) -> Timestamps {
        self.timestamps.clone()
    }

    fn extended_attributes(&self) -> Vec<ExtendedAttribute> {
        self.xattrs.clone()
    }
}
