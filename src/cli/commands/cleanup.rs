//! Cleanup command - remove old remote entries and stale local state

use crate::cache::CacheSynchronizer;
use crate::cli::args::CleanupArgs;
use crate::error::CacheResult;
use crate::ui::{self, TaskSpinner, UiContext};
use std::process::ExitCode;

/// Execute the cleanup command
pub async fn execute(
    args: CleanupArgs,
    sync: &CacheSynchronizer,
    ctx: &UiContext,
) -> CacheResult<ExitCode> {
    if !args.local_only {
        let days = args.days.unwrap_or_else(|| sync.config().ttl_days());
        let mut spinner = TaskSpinner::new(ctx);
        spinner.start(&format!("Removing cache entries older than {} days", days));

        match sync.cleanup(days).await {
            Ok(report) => spinner.stop(&format!(
                "Removed {} objects ({} entries)",
                report.objects_removed, report.entries_removed
            )),
            Err(e) => {
                spinner.stop_error("Remote cleanup failed");
                return Err(e);
            }
        }
    }

    let local = sync.cleanup_local().await?;
    ui::step_ok(
        ctx,
        &format!(
            "Removed {} stale locks and {} temp files",
            local.locks_removed, local.temp_files_removed
        ),
    );

    Ok(ExitCode::SUCCESS)
}
