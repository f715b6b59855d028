//! Analyze command - cached and installed state of project tools

use crate::cache::CacheSynchronizer;
use crate::error::CacheResult;
use crate::ui::{self, TaskSpinner, UiContext};
use std::process::ExitCode;

/// Execute the analyze command
pub async fn execute(sync: &CacheSynchronizer, ctx: &UiContext) -> CacheResult<ExitCode> {
    let mut spinner = TaskSpinner::new(ctx);
    spinner.start("Analyzing project tools");
    let statuses = match sync.analyze().await {
        Ok(statuses) => statuses,
        Err(e) => {
            spinner.stop_error("Analysis failed");
            return Err(e);
        }
    };
    spinner.clear();

    ui::header(ctx, "Project tools");
    if statuses.is_empty() {
        ui::remark(ctx, "No tools declared in .mise.toml or .tool-versions");
        return Ok(ExitCode::SUCCESS);
    }

    for status in &statuses {
        let installed = if status.installed {
            "installed"
        } else {
            "not installed"
        };
        let label = status.tool.to_string();
        if status.cached {
            ui::step_ok_detail(ctx, &label, &format!("cached, {}", installed));
        } else {
            ui::step_warn_hint(ctx, &label, &format!("not cached, {}", installed));
        }
    }

    let cached = statuses.iter().filter(|s| s.cached).count();
    ui::remark(
        ctx,
        &format!("{} of {} tools cached", cached, statuses.len()),
    );
    if cached < statuses.len() {
        ui::remark(ctx, "Run `mise-s3-cache warm` to fill the gaps");
    }

    Ok(ExitCode::SUCCESS)
}
