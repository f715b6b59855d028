//! mise-s3-cache - shared tool cache for mise
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use mise_s3_cache::cache::CacheSynchronizer;
use mise_s3_cache::cli::commands::{self, EXIT_MISS};
use mise_s3_cache::cli::{Cli, Commands};
use mise_s3_cache::config::{Config, ConfigManager};
use mise_s3_cache::error::{CacheError, CacheResult};
use mise_s3_cache::mise::Mise;
use mise_s3_cache::project::ProjectFiles;
use mise_s3_cache::ui::UiContext;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let hook_mode = cli.command.hook_mode();
    let signals_miss = matches!(cli.command, Commands::Check(_) | Commands::Restore(_));

    match run(cli).await {
        Ok(code) => code,
        Err(e) if hook_mode => {
            error!("Hook mode error (non-fatal): {}", e);
            hook_error_exit(signals_miss)
        }
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

/// In hook mode nothing fails the hook; check and restore report a miss
fn hook_error_exit(signals_miss: bool) -> ExitCode {
    if signals_miss {
        ExitCode::from(EXIT_MISS)
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(cli: Cli) -> CacheResult<ExitCode> {
    let hook_mode = cli.command.hook_mode();

    // An explicit --config takes the place of the discovered project file
    let local_config_path = match cli.config {
        Some(ref path) => Some(path.clone()),
        None if cli.no_local => None,
        None => {
            let cwd = std::env::current_dir()
                .map_err(|e| CacheError::io("getting current directory", e))?;
            ConfigManager::find_local_config(&cwd)
        }
    };

    let config = ConfigManager::new()
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(log_level(hook_mode, cli.verbose, config.debug), &config);
    if let Some(ref path) = local_config_path {
        debug!("Using project config: {}", path.display());
    }

    // Ensure state directories exist
    ConfigManager::ensure_state_dirs(&config).await?;

    let scope = Arc::new(ProjectFiles::from_cwd()?);
    let sync = CacheSynchronizer::connect(config, scope, Arc::new(Mise::new())).await;
    let ctx = UiContext::detect().with_quiet(hook_mode);

    // Dropping the command future releases any held lock guards
    tokio::select! {
        result = dispatch(cli.command, &sync, &ctx) => result,
        _ = tokio::signal::ctrl_c() => {
            if !hook_mode {
                eprintln!("{} interrupted", style("!").yellow());
            }
            Ok(ExitCode::from(130))
        }
    }
}

async fn dispatch(
    command: Commands,
    sync: &CacheSynchronizer,
    ctx: &UiContext,
) -> CacheResult<ExitCode> {
    match command {
        Commands::Check(args) => commands::check(args, sync, ctx).await,
        Commands::Restore(args) => commands::restore(args, sync, ctx).await,
        Commands::Store(args) => commands::store(args, sync, ctx).await,
        Commands::Cleanup(args) => commands::cleanup(args, sync, ctx).await,
        Commands::Stats => commands::stats(sync, ctx).await,
        Commands::Status(args) => commands::status(args, sync, ctx).await,
        Commands::Analyze => commands::analyze(sync, ctx).await,
        Commands::Warm(args) => commands::warm(args, sync, ctx).await,
        Commands::Test => commands::test(sync, ctx).await,
    }
}

/// Hook mode: error (warn with -v); otherwise 0 = info, 1 = debug, 2+ = trace
fn log_level(hook_mode: bool, verbose: u8, debug: bool) -> &'static str {
    let level = match (hook_mode, verbose) {
        (true, 0) => "error",
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    if debug && matches!(level, "error" | "warn" | "info") {
        "debug"
    } else {
        level
    }
}

fn init_logging(level: &str, config: &Config) {
    let filter = EnvFilter::new(format!("mise_s3_cache={}", level));
    let json = config.log_format.eq_ignore_ascii_case("json");
    let file = config.log_file.as_deref().and_then(open_log_file);

    match (json, file) {
        (true, Some(file)) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(Mutex::new(file))
            .init(),
        (true, None) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init(),
        (false, Some(file)) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        (false, None) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn open_log_file(path: &Path) -> Option<std::fs::File> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!(
                "{} cannot open log file {}: {}",
                style("Warning:").yellow(),
                path.display(),
                e
            );
            None
        }
    }
}
