use std::path::PathBuf;

use anyhow::Context;
use colored::{ColoredString, Colorize};
use tracing::info;
use vmdiff_cache::{ApiMaterializer, DiffCache, RunLayout};
use vmdiff_diff::{DiffOptions, EntityDiffer, FileSystemDiffer, ProcessDiffer};
use vmdiff_source::{DirectoryLister, MemorySnapshots};
use vmdiff_tree::DiffTree;
use vmdiff_types::{Diff, DiffStatus, Node, TreeIndex};

use crate::cli::*;
use crate::config::{ConfigError, DiskConfig, MemoryConfig, RunConfig};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        command,
        config,
        run_dir,
        format,
        ..
    } = cli;
    let config = RunConfig::load(&config)?;

    match command {
        Command::Run(args) => cmd_run(config, args).map(|_| ()),
        Command::Show(args) => cmd_show(&open_cache(run_dir, &config)?, &args.key, format),
        Command::Children(args) => {
            cmd_children(&open_cache(run_dir, &config)?, args.key.as_deref(), format)
        }
        Command::Tree(args) => cmd_tree(&open_cache(run_dir, &config)?, args.depth, format),
        Command::Status => cmd_status(&open_cache(run_dir, &config)?, format),
        Command::Materialize(args) => cmd_materialize(&open_cache(run_dir, &config)?, args.force),
    }
}

fn open_cache(run_dir: Option<PathBuf>, config: &RunConfig) -> anyhow::Result<DiffCache> {
    let layout = match run_dir {
        Some(dir) => RunLayout::at(dir),
        None => config.layout()?,
    };
    Ok(DiffCache::new(layout))
}

// ---------------------------------------------------------------
// run
// ---------------------------------------------------------------

fn cmd_run(mut config: RunConfig, args: RunArgs) -> anyhow::Result<DiffCache> {
    if args.no_cache {
        config.use_cache = false;
    }
    if let Some(dir) = args.results_dir {
        config.results_dir = dir;
    }
    config.validate()?;

    let cache = DiffCache::new(config.layout()?);
    let run_path = cache.layout().root().display().to_string();

    let cached = cache.is_ready() && (config.memory.is_none() || cache.has_process_store());
    if config.use_cache && cached {
        info!(run = %run_path, "results already cached");
        println!("{} Results cached at {}", "✓".green().bold(), run_path.bold());
        return Ok(cache);
    }
    info!(run = %run_path, "no cache found, diffing");

    let mut merged: Option<DiffTree> = None;
    if let Some(disk) = &config.disk {
        merged = Some(diff_disk(disk, &config.diff, &cache)?);
    }
    if let Some(memory) = &config.memory {
        let tree = diff_memory(&config, memory, &cache)?;
        merged = Some(match merged {
            Some(disk_tree) => disk_tree.merge(tree).context("failed to merge trees")?,
            None => tree,
        });
    }
    let index = merged.ok_or(ConfigError::NothingToDiff)?.into_index();

    cache.store_tree(&index).context("failed to store tree index")?;
    let summary = ApiMaterializer::new(&cache)
        .materialize(false)
        .context("failed to export API data")?;

    println!("{} Saved results to {}", "✓".green().bold(), run_path.bold());
    println!(
        "  Top-level nodes: {}, indexed keys: {}",
        index.forest.len().to_string().bold(),
        index.children.len().to_string().bold()
    );
    println!("  Exported diffs: {}", summary.diff_files);
    Ok(cache)
}

fn diff_disk(
    disk: &DiskConfig,
    options: &DiffOptions,
    cache: &DiffCache,
) -> anyhow::Result<DiffTree> {
    info!("diffing disk");
    let list = |root: &PathBuf| -> anyhow::Result<_> {
        DirectoryLister::new(root)
            .with_allow_dirs(&disk.allow_dirs)
            .with_ignore_dirs(&disk.ignore_dirs)?
            .list()
            .with_context(|| format!("failed to list snapshot {}", root.display()))
    };
    let before = list(&disk.before)?;
    let after = list(&disk.after)?;

    let mut differ = FileSystemDiffer::new(before, after, options.clone());
    let diffs = differ.diff_all();
    if diffs.is_empty() {
        info!("no disk differences found");
    }
    cache.store_filesystem(&diffs).context("failed to store disk diffs")?;

    let mut tree = DiffTree::new();
    tree.build(&mut differ);
    Ok(tree)
}

fn diff_memory(
    config: &RunConfig,
    memory: &MemoryConfig,
    cache: &DiffCache,
) -> anyhow::Result<DiffTree> {
    info!("diffing memory");
    let dir = config.plugin_dir(memory);
    let snapshots = MemorySnapshots::load(&dir, memory.plugins.as_slice())
        .with_context(|| format!("failed to load plugin output from {}", dir.display()))?;

    let mut differ = ProcessDiffer::new(
        snapshots.before,
        snapshots.after,
        memory.ignore_processes_regex.as_deref(),
    )?;
    let diffs = differ.diff_all();
    if diffs.is_empty() {
        info!("no memory differences found");
    }
    cache.store_processes(&diffs).context("failed to store memory diffs")?;

    let mut tree = DiffTree::new();
    tree.build(&mut differ);
    Ok(tree)
}

// ---------------------------------------------------------------
// queries
// ---------------------------------------------------------------

fn cmd_show(cache: &DiffCache, key: &str, format: OutputFormat) -> anyhow::Result<()> {
    let Some(diff) = cache.get_diff(key)? else {
        println!("No changes recorded for {}", key.yellow());
        return Ok(());
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&diff)?),
        OutputFormat::Text => print_diff(&diff),
    }
    Ok(())
}

fn cmd_children(cache: &DiffCache, key: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    let nodes = match key {
        Some(key) => cache.children(key)?,
        None => cache.forest()?,
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&nodes)?),
        OutputFormat::Text if nodes.is_empty() => println!("No children."),
        OutputFormat::Text => {
            for node in &nodes {
                println!("{}", node_line(node));
            }
        }
    }
    Ok(())
}

fn cmd_tree(cache: &DiffCache, depth: usize, format: OutputFormat) -> anyhow::Result<()> {
    let index = cache.load_tree_index()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&index)?),
        OutputFormat::Text => {
            for node in &index.forest {
                print_subtree(&index, node, 0, depth);
            }
        }
    }
    Ok(())
}

fn cmd_status(cache: &DiffCache, format: OutputFormat) -> anyhow::Result<()> {
    let layout = cache.layout();
    let ready = cache.is_ready();
    let processes = cache.has_process_store();
    let exported = layout.api_dir().is_dir();
    match format {
        OutputFormat::Json => {
            let status = serde_json::json!({
                "run": layout.root(),
                "ready": ready,
                "processes": processes,
                "exported": exported,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Text => {
            println!("Run: {}", layout.root().display().to_string().bold());
            println!("  Results: {}", flag(ready, "ready", "not ready"));
            println!("  Process diffs: {}", flag(processes, "stored", "none"));
            println!("  API export: {}", flag(exported, "present", "none"));
        }
    }
    Ok(())
}

fn cmd_materialize(cache: &DiffCache, force: bool) -> anyhow::Result<()> {
    if !cache.is_ready() {
        anyhow::bail!(
            "results at {} are not ready; run `vmdiff run` first",
            cache.layout().root().display()
        );
    }
    let summary = ApiMaterializer::new(cache).materialize(!force)?;
    if summary.reused {
        println!("API data already exported; pass --force to rewrite it.");
    } else {
        println!(
            "{} Exported {} children files and {} diffs to {}",
            "✓".green().bold(),
            summary.children_files,
            summary.diff_files,
            cache.layout().api_dir().display()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------
// rendering
// ---------------------------------------------------------------

fn flag(on: bool, yes: &str, no: &str) -> ColoredString {
    if on {
        yes.green()
    } else {
        no.dimmed()
    }
}

fn status_label(status: DiffStatus) -> ColoredString {
    match status {
        DiffStatus::Added => "A".green().bold(),
        DiffStatus::Removed => "D".red().bold(),
        DiffStatus::Modified => "M".yellow().bold(),
        DiffStatus::Unchanged => " ".normal(),
    }
}

fn node_line(node: &Node) -> String {
    let title = if node.is_directory {
        format!("{}/", node.title).blue().bold()
    } else {
        node.title.normal()
    };
    let mut line = format!("{} {}", status_label(node.status), title);
    if node.lines_added + node.lines_removed > 0 {
        line.push_str(&format!(
            " {} {}",
            format!("+{}", node.lines_added).green(),
            format!("-{}", node.lines_removed).red()
        ));
    }
    if !node.is_leaf {
        line.push_str(&format!(" ({} changed)", node.num_children).dimmed().to_string());
    }
    line
}

fn print_subtree(index: &TreeIndex, node: &Node, level: usize, depth: usize) {
    println!("{}{}", "  ".repeat(level), node_line(node));
    if level >= depth {
        return;
    }
    for child in index.children_of(&node.key) {
        print_subtree(index, child, level + 1, depth);
    }
}

fn print_diff(diff: &Diff) {
    println!(
        "{} {} {}",
        diff.title.bold(),
        status_label(diff.status),
        format!("+{} -{}", diff.lines_added, diff.lines_removed).dimmed()
    );
    for line in &diff.body {
        let header = ["diff --git", "+++", "---"].iter().any(|p| line.starts_with(p));
        let styled = if header {
            line.bold()
        } else if line.starts_with("@@") {
            line.cyan()
        } else if line.starts_with('+') {
            line.green()
        } else if line.starts_with('-') {
            line.red()
        } else {
            line.normal()
        };
        println!("{styled}");
    }
}
