//! Configuration schema for mise-s3-cache
//!
//! User configuration lives at `~/.config/mise/s3-cache.toml`; projects may add
//! `.mise-s3-cache.toml`. Every field has a default so partial files are valid.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// S3 or an S3-compatible service
    #[default]
    S3,
    /// A local or network-mounted directory acting as the bucket
    Fs,
}

impl Backend {
    /// Parse from a config or environment value
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Some(Self::S3),
            "fs" | "file" | "filesystem" => Some(Self::Fs),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 => write!(f, "s3"),
            Self::Fs => write!(f, "fs"),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master switch; a disabled cache turns every operation into a no-op
    pub enabled: bool,

    /// Storage backend
    pub backend: Backend,

    /// S3 bucket name
    pub bucket: String,

    /// S3 region
    pub region: String,

    /// Custom S3 endpoint (MinIO, R2, ...)
    pub endpoint: Option<String>,

    /// Root directory for the `fs` backend
    pub root: Option<PathBuf>,

    /// Key prefix for every object
    pub prefix: String,

    /// Entry lifetime used as the default cleanup age
    pub ttl_seconds: u64,

    /// Fan-out limit for bulk operations
    pub parallel_uploads: usize,

    /// Archive compression (only gzip is produced)
    pub compression: String,

    /// Force debug logging
    pub debug: bool,

    /// Append logs to this file instead of stderr
    pub log_file: Option<PathBuf>,

    /// Log format: "text" or "json"
    pub log_format: String,

    /// Local state directory (stats ledger, lock files)
    pub cache_dir: Option<PathBuf>,

    /// How long a store waits for another writer of the same key
    pub lock_timeout_secs: u64,

    /// Per-call bound on storage requests
    pub network_timeout_secs: u64,

    /// Retries for transient storage failures
    pub retries: u32,

    /// Reject entries that have no checksum object
    pub require_checksum: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: Backend::S3,
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            root: None,
            prefix: "mise-cache".to_string(),
            ttl_seconds: 604_800,
            parallel_uploads: 3,
            compression: "gzip".to_string(),
            debug: false,
            log_file: None,
            log_format: "text".to_string(),
            cache_dir: None,
            lock_timeout_secs: 300,
            network_timeout_secs: 30,
            retries: 2,
            require_checksum: false,
        }
    }
}

impl Config {
    /// Local state directory, honouring the `cache_dir` override
    pub fn state_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mise-s3")
        })
    }

    /// Path of the stats ledger document
    pub fn stats_path(&self) -> PathBuf {
        self.state_dir().join("stats.json")
    }

    /// Directory holding lock files
    pub fn locks_dir(&self) -> PathBuf {
        self.state_dir().join("locks")
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs.max(1))
    }

    /// Default cleanup age derived from the TTL, at least one day
    pub fn ttl_days(&self) -> u32 {
        u32::try_from((self.ttl_seconds / 86_400).max(1)).unwrap_or(u32::MAX)
    }

    /// Check the configuration is usable for storage operations
    pub fn validate(&self) -> CacheResult<()> {
        if !self.enabled {
            return Err(CacheError::Unavailable("cache is disabled".to_string()));
        }

        match self.backend {
            Backend::S3 => {
                if self.bucket.is_empty() {
                    return Err(CacheError::ConfigValue(
                        "S3 bucket not configured. Set MISE_S3_CACHE_BUCKET".to_string(),
                    ));
                }
                if !is_valid_bucket_name(&self.bucket) {
                    return Err(CacheError::ConfigValue(format!(
                        "invalid S3 bucket name: {}",
                        self.bucket
                    )));
                }
                if self.region.is_empty() {
                    return Err(CacheError::ConfigValue("S3 region cannot be empty".into()));
                }
            }
            Backend::Fs => {
                if self.root.is_none() {
                    return Err(CacheError::ConfigValue(
                        "fs backend needs a root directory. Set MISE_S3_CACHE_ROOT".to_string(),
                    ));
                }
            }
        }

        if self.prefix.is_empty()
            || self.prefix.contains("//")
            || self.prefix.starts_with('/')
            || self.prefix.ends_with('/')
            || self.prefix.split('/').any(|part| part == "..")
        {
            return Err(CacheError::ConfigValue(format!(
                "invalid key prefix: {}",
                self.prefix
            )));
        }

        if self.parallel_uploads == 0 {
            return Err(CacheError::ConfigValue(
                "parallel_uploads must be at least 1".to_string(),
            ));
        }

        if self.compression != "gzip" {
            return Err(CacheError::ConfigValue(format!(
                "unsupported compression: {} (only gzip)",
                self.compression
            )));
        }

        Ok(())
    }
}

/// Validate an S3 bucket name against the AWS naming rules
pub fn is_valid_bucket_name(name: &str) -> bool {
    if name.len() < 3 || name.len() > 63 {
        return false;
    }

    let bytes = name.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return false;
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        return false;
    }

    if name.contains("..") || name.contains(".-") || name.contains("-.") {
        return false;
    }

    // Must not look like an IPv4 address
    let parts: Vec<&str> = name.split('.').collect();
    let looks_like_ip = parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));

    !looks_like_ip
}
