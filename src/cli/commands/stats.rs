//! Stats command - show the local hit/miss ledger

use crate::cache::{CacheSynchronizer, StatsRecord};
use crate::error::CacheResult;
use crate::ui::{self, UiContext};
use std::process::ExitCode;

/// Execute the stats command
pub async fn execute(sync: &CacheSynchronizer, ctx: &UiContext) -> CacheResult<ExitCode> {
    let record = sync.stats().await?;

    ui::header(ctx, "Cache statistics");
    if record == StatsRecord::default() {
        ui::remark(ctx, "No cache activity recorded yet");
        ui::key_value(ctx, "Ledger", &sync.stats_path().display().to_string());
        return Ok(ExitCode::SUCCESS);
    }

    ui::section(ctx, "Totals");
    ui::key_value(ctx, "Hits", &record.cache_hits.to_string());
    ui::key_value(ctx, "Misses", &record.cache_misses.to_string());
    let rate = record
        .hit_rate()
        .map(|rate| format!("{:.1}%", rate))
        .unwrap_or_else(|| "n/a".to_string());
    ui::key_value(ctx, "Hit rate", &rate);
    ui::key_value(ctx, "Downloaded", &ui::human_size(record.total_savings_bytes));
    ui::key_value(ctx, "Uploads", &record.total_uploads.to_string());
    ui::key_value_status(
        ctx,
        "Upload failures",
        &record.upload_failures.to_string(),
        record.upload_failures == 0,
    );
    if let Some(updated) = record.updated_at {
        ui::key_value(ctx, "Updated", &updated.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    }

    ui::section(ctx, "Tools");
    for (tool, versions) in &record.tools {
        for (version, entry) in versions {
            let status = entry.status.as_deref().unwrap_or("-");
            let detail = format!(
                "{} hits, {} misses, avg {} ms, last {}",
                entry.hit_count, entry.miss_count, entry.avg_download_time_ms, status
            );
            ui::key_value(ctx, &format!("{}@{}", tool, version), &detail);
        }
    }

    ui::key_value(ctx, "Ledger", &sync.stats_path().display().to_string());
    Ok(ExitCode::SUCCESS)
}
