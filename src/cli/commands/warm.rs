//! Warm command - make every project tool installed and cached

use super::failure;
use crate::cache::{CacheSynchronizer, WarmAction};
use crate::cli::args::WarmArgs;
use crate::error::CacheResult;
use crate::ui::{self, TaskSpinner, UiContext};
use std::process::ExitCode;

/// Execute the warm command
pub async fn execute(
    args: WarmArgs,
    sync: &CacheSynchronizer,
    ctx: &UiContext,
) -> CacheResult<ExitCode> {
    let parallel = args.parallel.unwrap_or(if args.ci_mode {
        1
    } else {
        sync.config().parallel_uploads
    });

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start(&format!("Warming cache ({} at a time)", parallel.max(1)));
    let report = match sync.warm(parallel).await {
        Ok(report) => report,
        Err(e) => {
            spinner.stop_error("Cache warming failed");
            return Err(e);
        }
    };

    let failed = report.failures().count();
    if failed == 0 {
        spinner.stop(&format!("Warmed {} tools", report.results.len()));
    } else {
        spinner.stop_warn(&format!(
            "Warmed {} tools, {} failed",
            report.results.len() - failed,
            failed
        ));
    }

    for (tool, action) in &report.results {
        let label = tool.to_string();
        match action {
            WarmAction::UpToDate => ui::step_ok_detail(ctx, &label, "up to date"),
            WarmAction::Restored => ui::step_ok_detail(ctx, &label, "restored from cache"),
            WarmAction::Stored => ui::step_ok_detail(ctx, &label, "stored"),
            WarmAction::InstalledAndStored => {
                ui::step_ok_detail(ctx, &label, "installed and stored")
            }
            WarmAction::Failed(reason) => ui::step_error_detail(ctx, &label, reason),
        }
    }

    ui::remark(
        ctx,
        &format!(
            "{} restored, {} stored, {} installed, {} up to date",
            report.count(|a| matches!(a, WarmAction::Restored)),
            report.count(|a| matches!(a, WarmAction::Stored)),
            report.count(|a| matches!(a, WarmAction::InstalledAndStored)),
            report.count(|a| matches!(a, WarmAction::UpToDate)),
        ),
    );

    if args.ci_mode && failed > 0 {
        return Ok(failure(args.hook_mode));
    }
    Ok(ExitCode::SUCCESS)
}
