//! Project tool declarations
//!
//! Reads `.mise.toml` / `mise.toml` `[tools]` tables and `.tool-versions`
//! files from the working directory up to the repository root. Stores are
//! only allowed for tool versions a project declares.

use crate::cache::key::ToolVersionRef;
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const MISE_TOML_NAMES: &[&str] = &[".mise.toml", "mise.toml"];
const TOOL_VERSIONS: &str = ".tool-versions";

/// Decides which tool versions belong to the current project
#[async_trait]
pub trait ProjectScope: Send + Sync {
    /// Whether the project declares exactly this tool version
    async fn is_declared(&self, tool: &str, version: &str) -> bool;

    /// Every declared tool version, nearest declaration first
    async fn tools(&self) -> CacheResult<Vec<ToolVersionRef>>;
}

/// Scope backed by project files on disk
#[derive(Debug, Clone)]
pub struct ProjectFiles {
    start: PathBuf,
}

impl ProjectFiles {
    pub fn new(start: impl Into<PathBuf>) -> Self {
        Self {
            start: start.into(),
        }
    }

    /// Scope rooted at the process working directory
    pub fn from_cwd() -> CacheResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| CacheError::io("getting current directory", e))?;
        Ok(Self::new(cwd))
    }

    /// Declarations per directory, nearest directory first
    async fn declarations(&self) -> Vec<(PathBuf, BTreeMap<String, Vec<String>>)> {
        let mut found = Vec::new();
        let mut dir = Some(self.start.as_path());

        while let Some(current) = dir {
            for name in MISE_TOML_NAMES {
                let path = current.join(name);
                if let Some(content) = read_if_present(&path).await {
                    match parse_mise_toml(&content) {
                        Ok(tools) => found.push((path, tools)),
                        Err(e) => warn!("Ignoring unparseable {}: {}", path.display(), e),
                    }
                }
            }

            let path = current.join(TOOL_VERSIONS);
            if let Some(content) = read_if_present(&path).await {
                found.push((path, parse_tool_versions(&content)));
            }

            if current.join(".git").exists() {
                break;
            }
            dir = current.parent();
        }

        found
    }
}

async fn read_if_present(path: &Path) -> Option<String> {
    match fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            None
        }
    }
}

#[async_trait]
impl ProjectScope for ProjectFiles {
    async fn is_declared(&self, tool: &str, version: &str) -> bool {
        for (path, tools) in self.declarations().await {
            if tools
                .get(tool)
                .is_some_and(|versions| versions.iter().any(|v| v == version))
            {
                debug!("{}@{} declared in {}", tool, version, path.display());
                return true;
            }
        }
        false
    }

    async fn tools(&self) -> CacheResult<Vec<ToolVersionRef>> {
        let mut shadowed: BTreeSet<String> = BTreeSet::new();
        let mut result = Vec::new();

        for (path, tools) in self.declarations().await {
            let mut claimed_here = Vec::new();
            for (tool, versions) in tools {
                if shadowed.contains(&tool) {
                    continue;
                }
                for version in versions {
                    match ToolVersionRef::new(&tool, &version) {
                        Ok(r) if !result.contains(&r) => result.push(r),
                        Ok(_) => {}
                        Err(e) => debug!("Skipping entry in {}: {}", path.display(), e),
                    }
                }
                claimed_here.push(tool);
            }
            shadowed.extend(claimed_here);
        }

        Ok(result)
    }
}

/// Parse the `[tools]` table of a mise config
///
/// Values may be a version string, an array of version strings, or a table
/// with a `version` key.
pub fn parse_mise_toml(content: &str) -> Result<BTreeMap<String, Vec<String>>, toml::de::Error> {
    let parsed: toml::Table = toml::from_str(content)?;
    let mut tools = BTreeMap::new();

    let Some(section) = parsed.get("tools").and_then(|v| v.as_table()) else {
        return Ok(tools);
    };

    for (tool, value) in section {
        let versions: Vec<String> = match value {
            toml::Value::String(v) => vec![v.clone()],
            toml::Value::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    toml::Value::String(v) => Some(v.clone()),
                    toml::Value::Table(t) => t.get("version").and_then(|v| v.as_str()).map(String::from),
                    _ => None,
                })
                .collect(),
            toml::Value::Table(t) => t
                .get("version")
                .and_then(|v| v.as_str())
                .map(|v| vec![v.to_string()])
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        if !versions.is_empty() {
            tools.insert(tool.clone(), versions);
        }
    }

    Ok(tools)
}

/// Parse an asdf-style `.tool-versions` file: `tool v1 [v2 ...]` per line
pub fn parse_tool_versions(content: &str) -> BTreeMap<String, Vec<String>> {
    let mut tools = BTreeMap::new();
    for line in content.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        let mut parts = line.split_whitespace();
        let Some(tool) = parts.next() else { continue };
        let versions: Vec<String> = parts.map(String::from).collect();
        if !versions.is_empty() {
            tools.insert(tool.to_string(), versions);
        }
    }
    tools
}
