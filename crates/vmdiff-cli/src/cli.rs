use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vmdiff",
    about = "vmdiff: diff the disks and memory of two virtual machine snapshots",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run configuration file (TOML)
    #[arg(short, long, global = true, default_value = "vmdiff.toml")]
    pub config: PathBuf,

    /// Read results from this run directory instead of the configured one
    #[arg(long, global = true)]
    pub run_dir: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Diff the configured snapshots and store the results
    Run(RunArgs),
    /// Show the diff of one entity
    Show(ShowArgs),
    /// List the children of a node, or the top level
    Children(ChildrenArgs),
    /// Print the change tree
    Tree(TreeArgs),
    /// Show whether the run's results are ready
    Status,
    /// Export static per-key API files for the run
    Materialize(MaterializeArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Diff again even if results are cached
    #[arg(long)]
    pub no_cache: bool,
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct ShowArgs {
    /// A path such as `/etc/hosts` or a process id
    pub key: String,
}

#[derive(Args)]
pub struct ChildrenArgs {
    pub key: Option<String>,
}

#[derive(Args)]
pub struct TreeArgs {
    /// Levels to print below each top-level node
    #[arg(short, long, default_value = "3")]
    pub depth: usize,
}

#[derive(Args)]
pub struct MaterializeArgs {
    /// Overwrite an existing export
    #[arg(long)]
    pub force: bool,
}
