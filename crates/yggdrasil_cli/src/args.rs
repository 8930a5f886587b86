//! CLI argument definitions using clap derive.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "yggdrasil")]
#[command(version, about = "Knowledge forest migration and lookup")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(Args, Clone, Debug)]
pub struct GlobalOpts {
    /// SQLite store path
    #[arg(long, global = true, env = "YGGDRASIL_DB", default_value = "yggdrasil.db")]
    pub db: PathBuf,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true, env = "YGGDRASIL_LOG")]
    pub log_level: Option<String>,

    /// Absolute directory for rotated log files (default: stderr)
    #[arg(long, global = true, env = "YGGDRASIL_LOG_DIR")]
    pub log_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify legacy documents and merge them into the store
    Migrate(MigrateArgs),

    /// Print the Tree/Branch/Limb/Resource structure of the store
    Structure(StructureArgs),

    /// Full-text search over resources
    Search(SearchArgs),
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Directory holding legacy JSON documents
    pub root: PathBuf,

    /// Write to the store (default is analysis only)
    #[arg(long)]
    pub execute: bool,

    /// JSON config file
    #[arg(long, env = "YGGDRASIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(long)]
    pub recursive: bool,

    /// Also write each leaf as JSON into this directory (live mode only)
    #[arg(long, value_name = "DIR")]
    pub emit_leaves: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct StructureArgs {
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search terms (all must match)
    pub query: String,

    /// Only resources under this tree
    #[arg(long)]
    pub tree: Option<String>,

    #[arg(long, default_value_t = 20)]
    pub limit: u32,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
