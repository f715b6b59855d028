//! Tool manager adapter
//!
//! The cache never installs tools itself; it asks mise. The trait keeps the
//! synchronizer testable without a mise binary.

use crate::cache::key::ToolVersionRef;
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Operations the cache needs from a tool manager
#[async_trait]
pub trait ToolManager: Send + Sync {
    /// Manager version string recorded in entry metadata
    async fn version(&self) -> String;

    /// Directory where the manager keeps (or would keep) this tool version
    async fn install_path(&self, tool: &ToolVersionRef) -> PathBuf;

    /// Install a tool version from upstream
    async fn install(&self, tool: &ToolVersionRef) -> CacheResult<()>;
}

/// Adapter invoking the `mise` binary
#[derive(Debug, Clone)]
pub struct Mise {
    program: String,
}

impl Default for Mise {
    fn default() -> Self {
        Self {
            program: "mise".to_string(),
        }
    }
}

impl Mise {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific binary instead of `mise` from PATH
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn exec(&self, args: &[&str]) -> CacheResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.program, args);
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CacheError::command_failed(format!("{} {}", self.program, args.join(" ")), e))
    }
}

/// Where mise installs tools when it cannot be asked
pub fn default_install_path(tool: &ToolVersionRef) -> PathBuf {
    let data_dir = std::env::var_os("MISE_DATA_DIR")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share/mise")))
        .unwrap_or_else(|| PathBuf::from(".mise"));
    data_dir
        .join("installs")
        .join(tool.tool())
        .join(tool.version())
}

#[async_trait]
impl ToolManager for Mise {
    async fn version(&self) -> String {
        match self.exec(&["version"]).await {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                stdout
                    .split_whitespace()
                    .next()
                    .map(String::from)
                    .unwrap_or_else(|| "unknown".to_string())
            }
            _ => "unknown".to_string(),
        }
    }

    async fn install_path(&self, tool: &ToolVersionRef) -> PathBuf {
        match self.exec(&["where", tool.tool(), tool.version()]).await {
            Ok(output) if output.status.success() => {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if path.is_empty() {
                    default_install_path(tool)
                } else {
                    PathBuf::from(path)
                }
            }
            _ => default_install_path(tool),
        }
    }

    async fn install(&self, tool: &ToolVersionRef) -> CacheResult<()> {
        let spec = tool.to_string();
        let output = self.exec(&["install", &spec]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CacheError::command_exec(
                format!("{} install {}", self.program, spec),
                stderr.trim(),
            ));
        }
        Ok(())
    }
}
