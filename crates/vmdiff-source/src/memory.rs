//! Memory plugin output loading.
//!
//! A memory-analysis framework runs each plugin over both memory images and
//! leaves its JSON rows in one directory as `from-<plugin>.json` and
//! `to-<plugin>.json`. The process list is mandatory; the environment and
//! command-line plugins are read only when requested.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use vmdiff_diff::{CommandLine, EnvironmentVariable, ProcessRecord, ProcessSnapshot};

use crate::error::{SourceError, SourceResult};

pub const PSLIST_PLUGIN: &str = "windows.pslist.PsList";
pub const ENVARS_PLUGIN: &str = "windows.envars.Envars";
pub const CMDLINE_PLUGIN: &str = "windows.cmdline.CmdLine";

/// Plugins loaded when a run names none.
pub const DEFAULT_PLUGINS: [&str; 3] = [PSLIST_PLUGIN, ENVARS_PLUGIN, CMDLINE_PLUGIN];

/// Nested rows emitted by tree-shaped plugin renderers.
const CHILDREN_FIELD: &str = "__children";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Before,
    After,
}

impl Side {
    fn prefix(self) -> &'static str {
        match self {
            Self::Before => "from",
            Self::After => "to",
        }
    }
}

/// Process snapshots of the two memory images.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemorySnapshots {
    pub before: ProcessSnapshot,
    pub after: ProcessSnapshot,
}

impl MemorySnapshots {
    /// Load plugin output from `dir`.
    ///
    /// The process list is always read. Environment and command-line output
    /// is read when its plugin appears in `plugins`; other plugin names are
    /// ignored.
    pub fn load<S: AsRef<str>>(dir: &Path, plugins: &[S]) -> SourceResult<Self> {
        let wanted = |name: &str| plugins.iter().any(|p| p.as_ref() == name);
        let mut snapshots = Self::default();

        for side in [Side::Before, Side::After] {
            let snapshot = match side {
                Side::Before => &mut snapshots.before,
                Side::After => &mut snapshots.after,
            };
            snapshot.processes = load_process_list(&plugin_path(dir, side, PSLIST_PLUGIN))?;
            if wanted(ENVARS_PLUGIN) {
                snapshot.environment =
                    load_rows::<EnvironmentVariable>(&plugin_path(dir, side, ENVARS_PLUGIN))?;
            }
            if wanted(CMDLINE_PLUGIN) {
                snapshot.command_lines =
                    load_rows::<CommandLine>(&plugin_path(dir, side, CMDLINE_PLUGIN))?;
            }
        }

        for name in plugins.iter().map(AsRef::as_ref) {
            if !DEFAULT_PLUGINS.contains(&name) {
                debug!(plugin = name, "plugin output not used for diffing");
            }
        }

        info!(
            dir = %dir.display(),
            before = snapshots.before.processes.len(),
            after = snapshots.after.processes.len(),
            "loaded memory snapshots"
        );
        Ok(snapshots)
    }
}

fn plugin_path(dir: &Path, side: Side, plugin: &str) -> PathBuf {
    dir.join(format!("{}-{plugin}.json", side.prefix()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> SourceResult<T> {
    if !path.is_file() {
        return Err(SourceError::MissingPlugin {
            path: path.to_path_buf(),
        });
    }
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|source| SourceError::InvalidPluginOutput {
        path: path.to_path_buf(),
        source,
    })
}

fn load_rows<T: DeserializeOwned>(path: &Path) -> SourceResult<Vec<T>> {
    let rows: Vec<Value> = read_json(path)?;
    let mut flat = Vec::with_capacity(rows.len());
    for row in rows {
        flatten_into(row, &mut flat);
    }
    flat.into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row)).map_err(|source| {
                SourceError::InvalidPluginOutput {
                    path: path.to_path_buf(),
                    source,
                }
            })
        })
        .collect()
}

fn load_process_list(path: &Path) -> SourceResult<Vec<ProcessRecord>> {
    load_rows(path)
}

/// Hoist nested `__children` rows so every row stands alone.
fn flatten_into(row: Value, out: &mut Vec<serde_json::Map<String, Value>>) {
    let Value::Object(mut record) = row else {
        return;
    };
    let children = record.remove(CHILDREN_FIELD);
    out.push(record);
    if let Some(Value::Array(children)) = children {
        for child in children {
            flatten_into(child, out);
        }
    }
}
