//! Cache key derivation
//!
//! Keys are hierarchical object-storage paths:
//! `<prefix>/tools/<tool>/<version>/<platform>-<arch>`. The same inputs always
//! produce the same key, which is what makes restores idempotent and lets
//! concurrent readers share entries. Changing this layout orphans every
//! existing entry.

use crate::error::{CacheError, CacheResult};
use std::fmt;

/// Namespace segment under the prefix holding all tool entries
pub const TOOLS_NAMESPACE: &str = "tools";

const MAX_TOOL_LEN: usize = 100;
const MAX_VERSION_LEN: usize = 128;

/// A validated `(tool, version)` pair, safe to embed in keys and paths
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolVersionRef {
    tool: String,
    version: String,
}

impl ToolVersionRef {
    /// Validate and build a reference
    ///
    /// Tool names use letters, digits, `-` and `_`. Versions are opaque but
    /// limited to letters, digits, `.`, `+`, `-` and `_`, and cannot be a
    /// bare `.` or `..`.
    pub fn new(tool: &str, version: &str) -> CacheResult<Self> {
        validate_tool(tool)?;
        validate_version(version)?;
        Ok(Self {
            tool: tool.to_string(),
            version: version.to_string(),
        })
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for ToolVersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.tool, self.version)
    }
}

fn validate_tool(tool: &str) -> CacheResult<()> {
    if tool.is_empty() {
        return Err(CacheError::validation("tool name", tool, "must not be empty"));
    }
    if tool.len() > MAX_TOOL_LEN {
        return Err(CacheError::validation("tool name", tool, "is too long"));
    }
    if !tool
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CacheError::validation(
            "tool name",
            tool,
            "may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

fn validate_version(version: &str) -> CacheResult<()> {
    if version.is_empty() {
        return Err(CacheError::validation("version", version, "must not be empty"));
    }
    if version.len() > MAX_VERSION_LEN {
        return Err(CacheError::validation("version", version, "is too long"));
    }
    if version == "." || version == ".." {
        return Err(CacheError::validation("version", version, "is a path component"));
    }
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '_'))
    {
        return Err(CacheError::validation(
            "version",
            version,
            "may only contain letters, digits, '.', '+', '-' and '_'",
        ));
    }
    Ok(())
}

/// Operating system and architecture of the host, as used in keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPlatform {
    pub platform: String,
    pub arch: String,
}

impl HostPlatform {
    /// Detect the current host
    pub fn current() -> Self {
        let platform = match std::env::consts::OS {
            "macos" => "darwin".to_string(),
            other => other.to_ascii_lowercase(),
        };
        Self {
            platform,
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Build an explicit platform (tests, cross-platform inspection)
    pub fn new(platform: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            arch: arch.into(),
        }
    }

    /// The `<platform>-<arch>` key suffix
    pub fn suffix(&self) -> String {
        format!("{}-{}", self.platform, self.arch)
    }
}

/// Storage key of one cache slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    prefix: String,
    tool: ToolVersionRef,
    host: HostPlatform,
}

impl CacheKey {
    /// Derive the key for a tool version on a host
    pub fn derive(prefix: &str, tool: &str, version: &str, host: &HostPlatform) -> CacheResult<Self> {
        Ok(Self::for_ref(prefix, ToolVersionRef::new(tool, version)?, host))
    }

    /// Derive the key for an already-validated reference
    pub fn for_ref(prefix: &str, tool: ToolVersionRef, host: &HostPlatform) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            tool,
            host: host.clone(),
        }
    }

    pub fn tool_ref(&self) -> &ToolVersionRef {
        &self.tool
    }

    pub fn host(&self) -> &HostPlatform {
        &self.host
    }

    /// The key itself: `<prefix>/tools/<tool>/<version>/<platform>-<arch>`
    pub fn as_path(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.prefix,
            TOOLS_NAMESPACE,
            self.tool.tool(),
            self.tool.version(),
            self.host.suffix()
        )
    }

    /// Name of the wrapping directory inside the archive
    pub fn archive_root(&self) -> String {
        format!("{}-{}", self.tool.tool(), self.tool.version())
    }

    /// Object holding the compressed install tree
    pub fn archive_object(&self) -> String {
        format!("{}/{}.tar.gz", self.as_path(), self.archive_root())
    }

    /// Object holding the hex SHA-256 of the archive
    pub fn checksum_object(&self) -> String {
        format!("{}.sha256", self.archive_object())
    }

    /// Object holding the entry metadata document
    pub fn metadata_object(&self) -> String {
        format!("{}/metadata.json", self.as_path())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_path())
    }
}

/// Prefix covering every tool entry under a configured prefix
pub fn tools_prefix(prefix: &str) -> String {
    format!("{}/{}/", prefix.trim_end_matches('/'), TOOLS_NAMESPACE)
}
