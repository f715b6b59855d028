//! Check command - is a tool version cached?

use super::{hit_or_miss, missing_target};
use crate::cache::CacheSynchronizer;
use crate::cli::args::CheckArgs;
use crate::error::CacheResult;
use crate::ui::{self, UiContext};
use std::process::ExitCode;

/// Execute the check command
pub async fn execute(
    args: CheckArgs,
    sync: &CacheSynchronizer,
    ctx: &UiContext,
) -> CacheResult<ExitCode> {
    if args.all {
        return check_all(sync, ctx).await;
    }

    let Some((tool, version)) = args.target.pair() else {
        return missing_target(args.hook_mode);
    };

    let cached = sync.check(tool, version).await?;
    if cached {
        ui::step_ok(ctx, &format!("{}@{} exists in cache", tool, version));
    } else {
        ui::step_warn(ctx, &format!("{}@{} not found in cache", tool, version));
    }
    Ok(hit_or_miss(cached))
}

async fn check_all(sync: &CacheSynchronizer, ctx: &UiContext) -> CacheResult<ExitCode> {
    let tools = sync.project_tools().await?;
    if tools.is_empty() {
        ui::step_info(ctx, "No tools declared in this project");
        return Ok(ExitCode::SUCCESS);
    }

    let mut all_cached = true;
    for tool in &tools {
        if sync.check(tool.tool(), tool.version()).await? {
            ui::step_ok(ctx, &format!("{} cached", tool));
        } else {
            all_cached = false;
            ui::step_warn(ctx, &format!("{} not in cache", tool));
        }
    }

    Ok(hit_or_miss(all_cached))
}
