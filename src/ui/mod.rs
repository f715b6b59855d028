//! UI helpers for consistent CLI output
//!
//! Falls back to plain `[OK]`/`[WARN]` prefixed lines in CI and when stdout
//! is not a terminal, and prints nothing at all in quiet (hook) mode.
//!
//! # Example
//!
//! ```rust,ignore
//! use mise_s3_cache::ui::{self, UiContext};
//!
//! let ctx = UiContext::detect();
//! ui::header(&ctx, "Cache status");
//! ui::step_ok(&ctx, "Storage reachable");
//! ui::step_warn_hint(&ctx, "Bucket not set", "Set MISE_S3_CACHE_BUCKET");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    header, key_value, key_value_status, remark, section, step_error, step_error_detail,
    step_info, step_ok, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::{TaskProgress, TaskSpinner};

/// Format a byte count for humans
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
