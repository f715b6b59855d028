//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// mise-s3-cache - shared tool cache for mise
///
/// Stores installed tool versions in S3 (or a shared directory) and
/// restores them on other machines instead of installing from upstream.
#[derive(Parser, Debug)]
#[command(name = "mise-s3-cache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MISE_S3_CACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .mise-s3-cache.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check whether a tool version is cached (exit 0 cached, 1 missing)
    Check(CheckArgs),

    /// Restore a tool version from the cache
    Restore(RestoreArgs),

    /// Store an installed tool version in the cache
    Store(StoreArgs),

    /// Remove old cache entries
    Cleanup(CleanupArgs),

    /// Show cache hit/miss statistics
    Stats,

    /// Show configuration and backend status
    Status(StatusArgs),

    /// Show which project tools are cached and installed
    Analyze,

    /// Install, restore and store every project tool
    Warm(WarmArgs),

    /// Test read and write access to the backend
    Test,
}

impl Commands {
    /// Whether the command runs as a mise hook (silent, never fails the hook)
    pub fn hook_mode(&self) -> bool {
        match self {
            Self::Check(args) => args.hook_mode,
            Self::Restore(args) => args.hook_mode,
            Self::Store(args) => args.hook_mode,
            Self::Warm(args) => args.hook_mode,
            _ => false,
        }
    }
}

/// Tool and version, defaulting from the mise hook environment
#[derive(Args, Debug, Clone)]
pub struct ToolArgs {
    /// Tool name (e.g. node)
    #[arg(env = "MISE_TOOL_NAME")]
    pub tool: Option<String>,

    /// Tool version (e.g. 20.11.0)
    // `version` is taken by the --version flag on every subcommand
    #[arg(id = "tool_version", value_name = "VERSION", env = "MISE_TOOL_VERSION")]
    pub version: Option<String>,
}

impl ToolArgs {
    /// Both halves, when given
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (&self.tool, &self.version) {
            (Some(tool), Some(version)) => Some((tool.as_str(), version.as_str())),
            _ => None,
        }
    }
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub target: ToolArgs,

    /// Check every tool the project declares
    #[arg(long)]
    pub all: bool,

    /// Silent mode for mise hooks
    #[arg(long)]
    pub hook_mode: bool,
}

/// Arguments for the restore command
#[derive(Parser, Debug)]
pub struct RestoreArgs {
    #[command(flatten)]
    pub target: ToolArgs,

    /// Install directory to restore into (defaults to mise's)
    #[arg(short, long, env = "MISE_TOOL_INSTALL_PATH")]
    pub path: Option<PathBuf>,

    /// Restore every project tool that is not installed
    #[arg(long)]
    pub all: bool,

    /// Silent mode for mise hooks
    #[arg(long)]
    pub hook_mode: bool,

    /// Fail with a non-zero exit on any restore failure
    #[arg(long)]
    pub ci_mode: bool,
}

/// Arguments for the store command
#[derive(Parser, Debug)]
pub struct StoreArgs {
    #[command(flatten)]
    pub target: ToolArgs,

    /// Install directory to archive (defaults to mise's)
    #[arg(short, long, env = "MISE_TOOL_INSTALL_PATH")]
    pub path: Option<PathBuf>,

    /// Store every installed project tool
    #[arg(long)]
    pub all: bool,

    /// Store even if the project does not declare this tool version
    #[arg(short, long)]
    pub force: bool,

    /// Replace an existing cache entry
    #[arg(long)]
    pub overwrite: bool,

    /// Silent mode for mise hooks
    #[arg(long)]
    pub hook_mode: bool,

    /// Fail with a non-zero exit on any store failure
    #[arg(long)]
    pub ci_mode: bool,
}

/// Arguments for the cleanup command
#[derive(Parser, Debug)]
pub struct CleanupArgs {
    /// Remove entries older than this many days (defaults to the TTL, 7 days)
    #[arg(short, long)]
    pub days: Option<u32>,

    /// Only remove stale locks and temp files on this machine
    #[arg(long)]
    pub local_only: bool,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Print nothing; exit 0 when the cache is usable, 1 otherwise
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the warm command
#[derive(Parser, Debug)]
pub struct WarmArgs {
    /// Tools processed concurrently (defaults to parallel_uploads)
    #[arg(short = 'j', long)]
    pub parallel: Option<usize>,

    /// Silent mode for mise hooks
    #[arg(long)]
    pub hook_mode: bool,

    /// One tool at a time unless -j is given; failures exit non-zero
    #[arg(long)]
    pub ci_mode: bool,
}
