use serde::{Deserialize, Serialize};

/// Toggles for the filesystem differ.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Compare and show type, owner, group and mode.
    pub use_stat: bool,
    /// Compare timestamps when scanning for changed keys.
    pub use_times: bool,
    /// Compare and show extended attributes.
    pub use_attributes: bool,
    /// Diff file contents.
    pub use_contents: bool,
    /// Compare full-content digests when scanning for changed keys.
    pub use_hashes: bool,
    /// Emit a timestamp hunk in each diff.
    pub show_times: bool,
    /// Drop entities that are binary on either side.
    pub ignore_binary: bool,
    /// Drop directory entities.
    pub ignore_directories: bool,
    /// Drop files whose only differences are metadata.
    pub ignore_contents_unchanged: bool,
    /// List only keys present on both sides.
    pub only_changed_files: bool,
    /// Unchanged lines kept around each content change.
    pub context_lines: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            use_stat: true,
            use_times: true,
            use_attributes: true,
            use_contents: true,
            use_hashes: false,
            show_times: false,
            ignore_binary: true,
            ignore_directories: false,
            ignore_contents_unchanged: false,
            only_changed_files: false,
            context_lines: 0,
        }
    }
}

impl DiffOptions {
    /// Options that diff every dimension, binaries included.
    pub fn everything() -> Self {
        Self {
            use_hashes: true,
            show_times: true,
            ignore_binary: false,
            ..Self::default()
        }
    }

    /// Packed boolean toggles, stable across releases. Used to derive cache
    /// directory names.
    pub fn bitfield(&self) -> u16 {
        [
            self.use_stat,
            self.use_times,
            self.use_attributes,
            self.use_contents,
            self.use_hashes,
            self.show_times,
            self.ignore_binary,
            self.ignore_directories,
            self.ignore_contents_unchanged,
            self.only_changed_files,
        ]
        .iter()
        .enumerate()
        .fold(0, |bits, (i, &on)| if on { bits | (1 << i) } else { bits })
    }
}
