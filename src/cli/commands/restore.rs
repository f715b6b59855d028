//! Restore command - pull cached tool versions into their install directories

use super::{failure, hit_or_miss, missing_target};
use crate::cache::{is_installed, CacheSynchronizer, RestoreOutcome, ToolVersionRef};
use crate::cli::args::RestoreArgs;
use crate::error::CacheResult;
use crate::ui::{self, TaskProgress, TaskSpinner, UiContext};
use std::process::ExitCode;
use tracing::debug;

/// Execute the restore command
pub async fn execute(
    args: RestoreArgs,
    sync: &CacheSynchronizer,
    ctx: &UiContext,
) -> CacheResult<ExitCode> {
    if args.all {
        return restore_all(&args, sync, ctx).await;
    }

    let Some((tool, version)) = args.target.pair() else {
        return missing_target(args.hook_mode);
    };

    let tool_ref = ToolVersionRef::new(tool, version)?;
    let dest = match args.path {
        Some(path) => path,
        None => sync.install_path(&tool_ref).await,
    };
    debug!("Restoring {} into {}", tool_ref, dest.display());

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start(&format!("Restoring {} from cache", tool_ref));

    let outcome = sync.restore(tool, version, &dest).await?;
    match &outcome {
        RestoreOutcome::Restored {
            size_bytes,
            elapsed_ms,
        } => spinner.stop(&format!(
            "Restored {} ({} in {} ms)",
            tool_ref,
            ui::human_size(*size_bytes),
            elapsed_ms
        )),
        RestoreOutcome::Miss => spinner.stop_warn(&format!("{} not found in cache", tool_ref)),
        RestoreOutcome::Unavailable => spinner.stop_warn(&format!(
            "Cache unavailable: {}",
            sync.unavailable_reason().unwrap_or("storage unreachable")
        )),
        RestoreOutcome::IntegrityFailure => {
            spinner.stop_error(&format!("{} failed checksum verification", tool_ref))
        }
        RestoreOutcome::ExtractionFailure => {
            spinner.stop_error(&format!("{} could not be extracted", tool_ref))
        }
    }

    Ok(hit_or_miss(outcome.is_restored()))
}

/// Restore every declared tool that is not installed yet
async fn restore_all(
    args: &RestoreArgs,
    sync: &CacheSynchronizer,
    ctx: &UiContext,
) -> CacheResult<ExitCode> {
    let tools = sync.project_tools().await?;
    let progress = TaskProgress::new(ctx, "Restoring", tools.len() as u64);

    let mut restored = Vec::new();
    let mut failed = Vec::new();
    let mut missed = 0usize;
    let mut installed = 0usize;

    for tool in &tools {
        let dest = sync.install_path(tool).await;
        if is_installed(&dest).await {
            installed += 1;
            progress.inc(&format!("{} already installed", tool));
            continue;
        }

        match sync.restore(tool.tool(), tool.version(), &dest).await? {
            RestoreOutcome::Restored { .. } => restored.push(tool),
            RestoreOutcome::Miss => missed += 1,
            other => failed.push((tool, other)),
        }
        progress.inc(&tool.to_string());
    }
    progress.finish();

    for tool in &restored {
        ui::step_ok(ctx, &format!("Restored {}", tool));
    }
    for (tool, outcome) in &failed {
        ui::step_error_detail(ctx, &tool.to_string(), &format!("{:?}", outcome));
    }
    ui::remark(
        ctx,
        &format!(
            "{} restored, {} already installed, {} not cached, {} failed",
            restored.len(),
            installed,
            missed,
            failed.len()
        ),
    );

    if args.ci_mode && !failed.is_empty() {
        return Ok(failure(args.hook_mode));
    }
    Ok(ExitCode::SUCCESS)
}
