//! CLI command implementations
//!
//! Each command returns the process exit code on success. Hook-mode callers
//! read exit 1 from `check` and `restore` as "not cached, install normally".

pub mod analyze;
pub mod check;
pub mod cleanup;
pub mod restore;
pub mod stats;
pub mod status;
pub mod store;
pub mod warm;

pub use analyze::execute as analyze;
pub use check::execute as check;
pub use cleanup::execute as cleanup;
pub use restore::execute as restore;
pub use stats::execute as stats;
pub use status::execute as status;
pub use store::execute as store;
pub use test::execute as test;
pub use warm::execute as warm;

use crate::error::{CacheError, CacheResult};
use std::process::ExitCode;
use tracing::debug;

/// Exit code telling a hook the tool is not cached
pub const EXIT_MISS: u8 = 1;

/// Exit code for a hit or a miss
pub fn hit_or_miss(hit: bool) -> ExitCode {
    if hit {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_MISS)
    }
}

/// Exit code for a failed operation; hooks are never failed
pub fn failure(hook_mode: bool) -> ExitCode {
    if hook_mode {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Neither a tool/version pair nor `--all` was given
pub fn missing_target(hook_mode: bool) -> CacheResult<ExitCode> {
    if hook_mode {
        debug!("No tool given to hook, nothing to do");
        return Ok(ExitCode::SUCCESS);
    }
    Err(CacheError::User(
        "Provide TOOL and VERSION, or use --all".to_string(),
    ))
}
