//! Process differ: compares two process-list snapshots keyed by process id.
//!
//! Each process is rendered as canonical JSON (sorted keys, four-space
//! indent) after its environment variables and command line are merged in,
//! and the two renderings are line-diffed with full context.

use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use vmdiff_types::Diff;

use crate::error::{DiffError, DiffResult};
use crate::line_diff::{unified_diff, Context};
use crate::traits::{EntityDiffer, EntitySpace};
use crate::unified::UnifiedDiff;

/// One process record as emitted by the process-list plugin.
pub type ProcessRecord = Map<String, Value>;

/// Field dropped before comparison because it changes constantly.
pub const VOLATILE_FIELD: &str = "Threads";
pub const ENVIRONMENT_FIELD: &str = "EnvironmentVariables";
pub const COMMAND_LINE_FIELD: &str = "CommandLine";

/// Command-line text reported for processes that exited during capture.
pub const EXITED_MARKER: &str = "is not valid (process exited?)";

/// One row of the environment-variable plugin output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    #[serde(rename = "PID")]
    pub pid: u64,
    #[serde(rename = "Variable")]
    pub variable: String,
    #[serde(rename = "Value", default)]
    pub value: Value,
}

/// One row of the command-line plugin output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandLine {
    #[serde(rename = "PID")]
    pub pid: u64,
    #[serde(rename = "Args", default)]
    pub args: Value,
}

/// The plugin outputs captured from one memory image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessSnapshot {
    pub processes: Vec<ProcessRecord>,
    pub environment: Vec<EnvironmentVariable>,
    pub command_lines: Vec<CommandLine>,
}

/// A process prepared for diffing.
#[derive(Clone, Debug)]
struct Process {
    name: String,
    title: String,
    parent: Option<String>,
    exited: bool,
    lines: Vec<String>,
}

fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Rebuild a value with every object's keys in ascending order.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Render a record as sorted, four-space-indented JSON lines.
fn canonical_lines(record: &ProcessRecord) -> DiffResult<Vec<String>> {
    let value = sorted(&Value::Object(record.clone()));
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| DiffError::Serialization(e.to_string()))?;
    let text = String::from_utf8(buf).map_err(|e| DiffError::Serialization(e.to_string()))?;
    Ok(text.lines().map(str::to_string).collect())
}

/// Index a snapshot by process id with side tables merged in.
fn index(snapshot: ProcessSnapshot) -> DiffResult<BTreeMap<String, Process>> {
    let mut records: BTreeMap<String, ProcessRecord> = BTreeMap::new();
    for mut record in snapshot.processes {
        let Some(pid) = record.get("PID").and_then(id_of) else {
            warn!("skipping process record without a PID");
            continue;
        };
        record.remove(VOLATILE_FIELD);
        records.insert(pid, record);
    }

    let mut environments: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    for var in snapshot.environment {
        environments
            .entry(var.pid.to_string())
            .or_default()
            .insert(var.variable, var.value);
    }
    for (pid, vars) in environments {
        match records.get_mut(&pid) {
            Some(record) => {
                record.insert(ENVIRONMENT_FIELD.to_string(), Value::Object(vars));
            }
            None => debug!(pid = %pid, "environment for unknown process"),
        }
    }

    for cmdline in snapshot.command_lines {
        let pid = cmdline.pid.to_string();
        match records.get_mut(&pid) {
            Some(record) => {
                record.insert(COMMAND_LINE_FIELD.to_string(), cmdline.args);
            }
            None => debug!(pid = %pid, "command line for unknown process"),
        }
    }

    records
        .into_iter()
        .map(|(pid, record)| -> DiffResult<(String, Process)> {
            let name = record
                .get("ImageFileName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let exited = record
                .get(COMMAND_LINE_FIELD)
                .and_then(Value::as_str)
                .is_some_and(|args| args.contains(EXITED_MARKER));
            let process = Process {
                title: format!("{name}-{pid}"),
                name,
                parent: record.get("PPID").and_then(id_of),
                exited,
                lines: canonical_lines(&record)?,
            };
            Ok((pid, process))
        })
        .collect()
}

/// Diffs two process-list snapshots.
pub struct ProcessDiffer {
    before: BTreeMap<String, Process>,
    after: BTreeMap<String, Process>,
    ignore: Option<Regex>,
    changed: OnceCell<BTreeSet<String>>,
    memo: HashMap<String, Option<Diff>>,
}

impl ProcessDiffer {
    /// Create a differ. Processes whose image name matches `ignore_regex` are
    /// treated as absent on that side.
    pub fn new(
        before: ProcessSnapshot,
        after: ProcessSnapshot,
        ignore_regex: Option<&str>,
    ) -> DiffResult<Self> {
        let ignore = match ignore_regex {
            Some(pattern) if !pattern.is_empty() => Some(Regex::new(pattern)?),
            _ => None,
        };
        Ok(Self {
            before: index(before)?,
            after: index(after)?,
            ignore,
            changed: OnceCell::new(),
            memo: HashMap::new(),
        })
    }

    /// A side's process as it takes part in the comparison.
    fn effective<'a>(&self, side: &'a BTreeMap<String, Process>, pid: &str) -> Option<&'a Process> {
        let process = side.get(pid)?;
        if process.exited {
            debug!(pid, "process exited during capture");
            return None;
        }
        if let Some(re) = &self.ignore {
            if re.is_match(&process.name) {
                info!(pid, name = %process.name, "ignoring process matching filter");
                return None;
            }
        }
        Some(process)
    }

    fn lines_of(process: Option<&Process>) -> &[String] {
        match process {
            Some(p) => &p.lines,
            None => &[],
        }
    }

    fn scan(&self) -> BTreeSet<String> {
        let pids: BTreeSet<&String> = self.before.keys().chain(self.after.keys()).collect();
        let changed: BTreeSet<String> = pids
            .into_iter()
            .filter(|pid| {
                let a = self.effective(&self.before, pid);
                let b = self.effective(&self.after, pid);
                Self::lines_of(a) != Self::lines_of(b)
            })
            .cloned()
            .collect();
        info!(
            before = self.before.len(),
            after = self.after.len(),
            changed = changed.len(),
            "scanned process snapshots"
        );
        changed
    }

    fn compute(&self, pid: &str) -> Option<Diff> {
        let a = self.effective(&self.before, pid);
        let b = self.effective(&self.after, pid);

        let from = a.or(b)?.title.as_str();
        let to = b.or(a)?.title.as_str();

        let hunks = unified_diff(Self::lines_of(a), Self::lines_of(b), from, to, Context::Full);
        if hunks.is_empty() {
            return None;
        }

        let mut body = vec![format!("diff --git {from} {to}")];
        match (a, b) {
            (None, Some(_)) => body.push("new file".to_string()),
            (Some(_), None) => body.push("deleted file".to_string()),
            _ => {}
        }
        body.extend(hunks);

        let parent = self
            .after
            .get(pid)
            .or_else(|| self.before.get(pid))
            .and_then(|p| p.parent.clone());

        Some(UnifiedDiff::new(body).into_diff(pid, false, to, parent))
    }
}

impl EntityDiffer for ProcessDiffer {
    fn space(&self) -> EntitySpace {
        EntitySpace::Process
    }

    fn list_changed_keys(&self) -> &BTreeSet<String> {
        self.changed.get_or_init(|| self.scan())
    }

    fn diff(&mut self, key: &str) -> Option<Diff> {
        if let Some(hit) = self.memo.get(key) {
            return hit.clone();
        }
        let result = self.compute(key);
        self.memo.insert(key.to_string(), result.clone());
        result
    }
}
