//! Status command - show configuration and backend availability

use crate::cache::CacheSynchronizer;
use crate::cli::args::StatusArgs;
use crate::config::Backend;
use crate::error::CacheResult;
use crate::ui::{self, UiContext};
use std::process::ExitCode;

/// Execute the status command
pub async fn execute(
    args: StatusArgs,
    sync: &CacheSynchronizer,
    ctx: &UiContext,
) -> CacheResult<ExitCode> {
    if args.quiet {
        return Ok(if sync.is_available() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let config = sync.config();
    ui::header(ctx, "mise-s3-cache status");

    ui::section(ctx, "Configuration");
    ui::key_value_status(ctx, "Enabled", &config.enabled.to_string(), config.enabled);
    match config.backend {
        Backend::S3 => {
            ui::key_value(ctx, "Backend", "s3");
            let bucket = if config.bucket.is_empty() {
                "(not set)"
            } else {
                config.bucket.as_str()
            };
            ui::key_value_status(ctx, "Bucket", bucket, !config.bucket.is_empty());
            ui::key_value(ctx, "Region", &config.region);
            if let Some(ref endpoint) = config.endpoint {
                ui::key_value(ctx, "Endpoint", endpoint);
            }
        }
        Backend::Fs => {
            ui::key_value(ctx, "Backend", "fs");
            let root = config
                .root
                .as_ref()
                .map(|root| root.display().to_string())
                .unwrap_or_else(|| "(not set)".to_string());
            ui::key_value_status(ctx, "Root", &root, config.root.is_some());
        }
    }
    ui::key_value(ctx, "Prefix", &config.prefix);
    ui::key_value(ctx, "TTL", &format!("{} days", config.ttl_days()));
    ui::key_value(ctx, "Parallelism", &config.parallel_uploads.to_string());
    ui::key_value(ctx, "State dir", &config.state_dir().display().to_string());

    ui::section(ctx, "Host");
    ui::key_value(ctx, "Platform", &sync.host().suffix());

    ui::section(ctx, "Backend");
    match sync.describe_store() {
        Some(store) => {
            ui::step_ok_detail(ctx, "Cache available", &store);
            match sync.usage().await {
                Ok(usage) => ui::key_value(
                    ctx,
                    "Stored",
                    &format!(
                        "{} entries, {} objects, {}",
                        usage.entries,
                        usage.objects,
                        ui::human_size(usage.total_bytes)
                    ),
                ),
                Err(e) => ui::step_error_detail(ctx, "Listing entries failed", &e.to_string()),
            }
        }
        None => ui::step_warn_hint(
            ctx,
            "Cache unavailable",
            sync.unavailable_reason().unwrap_or("unknown reason"),
        ),
    }

    Ok(ExitCode::SUCCESS)
}
