use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vmdiff_cache::RunLayout;
use vmdiff_diff::{ContentHasher, DiffOptions};
use vmdiff_source::DEFAULT_PLUGINS;

pub const DEFAULT_RESULTS_DIR: &str = "results";

/// Hex characters of the option hash kept in a run id.
const RUN_HASH_LEN: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("nothing to diff: configure a [disk] or [memory] section")]
    NothingToDiff,

    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Everything one `vmdiff run` needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Parent of every run directory.
    pub results_dir: PathBuf,
    /// Skip diffing when the run's results already exist.
    pub use_cache: bool,
    pub disk: Option<DiskConfig>,
    pub memory: Option<MemoryConfig>,
    pub diff: DiffOptions,
}

/// Two snapshot directories to diff.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskConfig {
    pub before: PathBuf,
    pub after: PathBuf,
    /// Only list paths under (or leading to) these directories.
    #[serde(default)]
    pub allow_dirs: Vec<String>,
    /// Regular expressions for paths to prune.
    #[serde(default)]
    pub ignore_dirs: Vec<String>,
}

/// Plugin output of two memory images.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Image names, used in the run id and the default plugin directory.
    pub before: String,
    pub after: String,
    /// Directory holding `from-<plugin>.json` and `to-<plugin>.json`.
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,
    #[serde(default = "default_plugins")]
    pub plugins: Vec<String>,
    /// Processes whose image name matches are left out.
    #[serde(default)]
    pub ignore_processes_regex: Option<String>,
}

fn default_plugins() -> Vec<String> {
    DEFAULT_PLUGINS.iter().map(|p| p.to_string()).collect()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            use_cache: true,
            disk: None,
            memory: None,
            diff: DiffOptions::default(),
        }
    }
}

impl RunConfig {
    /// Load a TOML config. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fails unless at least one of disk and memory is configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.disk.is_none() && self.memory.is_none() {
            return Err(ConfigError::NothingToDiff);
        }
        Ok(())
    }

    /// `{before}--{after}--{hash}`, named after the disk snapshots when a
    /// disk is configured and after the memory images otherwise.
    ///
    /// The hash covers the diff options and directory filters, so runs with
    /// different settings never share a directory.
    pub fn run_id(&self) -> Result<String, ConfigError> {
        let (before, after) = match (&self.disk, &self.memory) {
            (Some(disk), _) => (snapshot_name(&disk.before), snapshot_name(&disk.after)),
            (None, Some(memory)) => (memory.before.clone(), memory.after.clone()),
            (None, None) => return Err(ConfigError::NothingToDiff),
        };

        let mut input = format!("{:04x}:{}", self.diff.bitfield(), self.diff.context_lines);
        if let Some(disk) = &self.disk {
            for list in [&disk.allow_dirs, &disk.ignore_dirs] {
                let mut sorted: Vec<&str> = list.iter().map(String::as_str).collect();
                sorted.sort_unstable();
                input.push('\n');
                input.push_str(&sorted.join("\n"));
            }
        }
        let hash = ContentHasher::RUN.hash(input.as_bytes()).to_hex();
        Ok(format!("{before}--{after}--{}", &hash[..RUN_HASH_LEN]))
    }

    pub fn layout(&self) -> Result<RunLayout, ConfigError> {
        Ok(RunLayout::new(&self.results_dir, &self.run_id()?))
    }

    /// Where `memory`'s plugin output lives.
    pub fn plugin_dir(&self, memory: &MemoryConfig) -> PathBuf {
        memory.plugin_dir.clone().unwrap_or_else(|| {
            self.results_dir
                .join("memory")
                .join(format!("{}__{}", memory.before, memory.after))
        })
    }
}

fn snapshot_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
