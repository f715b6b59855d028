//! Store command - upload installed tool versions to the cache

use super::{failure, missing_target};
use crate::cache::{
    is_installed, CacheSynchronizer, SkipReason, StoreOptions, StoreOutcome, ToolVersionRef,
};
use crate::cli::args::StoreArgs;
use crate::error::CacheResult;
use crate::ui::{self, TaskProgress, TaskSpinner, UiContext};
use std::process::ExitCode;

/// Execute the store command
pub async fn execute(
    args: StoreArgs,
    sync: &CacheSynchronizer,
    ctx: &UiContext,
) -> CacheResult<ExitCode> {
    let options = StoreOptions {
        ignore_scope: args.force,
        overwrite: args.overwrite,
    };

    if args.all {
        return store_all(&args, options, sync, ctx).await;
    }

    let Some((tool, version)) = args.target.pair() else {
        return missing_target(args.hook_mode);
    };

    let tool_ref = ToolVersionRef::new(tool, version)?;
    let source = match args.path {
        Some(ref path) => path.clone(),
        None => sync.install_path(&tool_ref).await,
    };

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start(&format!("Storing {} in cache", tool_ref));

    let outcome = sync.store_with(tool, version, &source, options).await?;
    let ok = match &outcome {
        StoreOutcome::Stored { size_bytes } => {
            spinner.stop(&format!(
                "Stored {} ({})",
                tool_ref,
                ui::human_size(*size_bytes)
            ));
            true
        }
        StoreOutcome::Skipped(SkipReason::AlreadyCached) => {
            spinner.stop(&format!("{} already cached", tool_ref));
            true
        }
        StoreOutcome::Skipped(SkipReason::NotDeclared) => {
            spinner.stop_warn(&format!(
                "{} is not declared by this project, skipped (use --force)",
                tool_ref
            ));
            true
        }
        StoreOutcome::Skipped(SkipReason::Unavailable) => {
            spinner.stop_warn(&format!(
                "Cache unavailable: {}",
                sync.unavailable_reason().unwrap_or("storage unreachable")
            ));
            !args.ci_mode
        }
        StoreOutcome::LockTimeout => {
            spinner.stop_error(&format!(
                "Timed out waiting for another process storing {}",
                tool_ref
            ));
            false
        }
        StoreOutcome::SourceMissing => {
            spinner.stop_error(&format!("Install directory not found: {}", source.display()));
            false
        }
        StoreOutcome::UploadFailure(reason) => {
            spinner.stop_error(&format!("Failed to store {}: {}", tool_ref, reason));
            false
        }
    };

    if ok {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(failure(args.hook_mode))
    }
}

/// Store every declared tool that is installed locally
async fn store_all(
    args: &StoreArgs,
    options: StoreOptions,
    sync: &CacheSynchronizer,
    ctx: &UiContext,
) -> CacheResult<ExitCode> {
    let tools = sync.project_tools().await?;
    let progress = TaskProgress::new(ctx, "Storing", tools.len() as u64);

    let mut stored = Vec::new();
    let mut failed = Vec::new();
    let mut skipped = 0usize;

    for tool in &tools {
        let source = sync.install_path(tool).await;
        if !is_installed(&source).await {
            skipped += 1;
            progress.inc(&format!("{} not installed", tool));
            continue;
        }

        match sync
            .store_with(tool.tool(), tool.version(), &source, options)
            .await?
        {
            StoreOutcome::Stored { size_bytes } => stored.push((tool, size_bytes)),
            StoreOutcome::Skipped(SkipReason::Unavailable) => {
                failed.push((tool, "cache unavailable".to_string()))
            }
            StoreOutcome::Skipped(_) => skipped += 1,
            StoreOutcome::LockTimeout => failed.push((tool, "lock timeout".to_string())),
            StoreOutcome::SourceMissing => failed.push((tool, "install missing".to_string())),
            StoreOutcome::UploadFailure(reason) => failed.push((tool, reason)),
        }
        progress.inc(&tool.to_string());
    }
    progress.finish();

    for (tool, size) in &stored {
        ui::step_ok_detail(ctx, &format!("Stored {}", tool), &ui::human_size(*size));
    }
    for (tool, reason) in &failed {
        ui::step_error_detail(ctx, &tool.to_string(), reason);
    }
    ui::remark(
        ctx,
        &format!(
            "{} stored, {} skipped, {} failed",
            stored.len(),
            skipped,
            failed.len()
        ),
    );

    if args.ci_mode && !failed.is_empty() {
        return Ok(failure(args.hook_mode));
    }
    Ok(ExitCode::SUCCESS)
}
