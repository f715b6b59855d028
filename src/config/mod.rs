//! Configuration management for mise-s3-cache
//!
//! Layers, later overriding earlier: built-in defaults, the user file, the
//! project-local file, then `MISE_S3_CACHE_*` environment variables.

pub mod schema;

pub use schema::{Backend, Config};

use crate::error::{CacheError, CacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Project-local config file names, in lookup order
pub const LOCAL_CONFIG_NAMES: &[&str] = &[".mise-s3-cache.toml", ".mise-s3-cache.conf"];

/// Prefix shared by every configuration environment variable
const ENV_PREFIX: &str = "MISE_S3_CACHE_";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mise")
            .join("s3-cache.toml")
    }

    /// Find a project-local config, walking up until a repository root
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        let mut current = Some(start);
        while let Some(dir) = current {
            for name in LOCAL_CONFIG_NAMES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
            if dir.join(".git").exists() {
                break;
            }
            current = dir.parent();
        }
        None
    }

    /// Load the user config, overlay the local config, then apply environment
    pub async fn load_merged(&self, local: Option<&Path>) -> CacheResult<Config> {
        let mut merged = match toml::Value::try_from(Config::default())? {
            toml::Value::Table(table) => table,
            _ => toml::Table::new(),
        };

        if let Some(user) = self.user_config_file() {
            debug!("Loading user config from {}", user.display());
            merge_tables(&mut merged, Self::read_table(&user).await?);
        } else {
            debug!("User config not found, using defaults");
        }

        if let Some(local) = local {
            debug!("Loading local config from {}", local.display());
            merge_tables(&mut merged, Self::read_table(local).await?);
        }

        let mut config: Config = toml::Value::Table(merged).try_into().map_err(
            |e: toml::de::Error| CacheError::ConfigInvalid {
                path: local.unwrap_or(&self.config_path).to_path_buf(),
                reason: e.to_string(),
            },
        )?;

        apply_env(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Resolve which user file exists, accepting a `.conf` sibling
    fn user_config_file(&self) -> Option<PathBuf> {
        if self.config_path.is_file() {
            return Some(self.config_path.clone());
        }
        if self.config_path.extension().is_some_and(|ext| ext == "toml") {
            let conf = self.config_path.with_extension("conf");
            if conf.is_file() {
                return Some(conf);
            }
        }
        None
    }

    /// Read a config file into a TOML table, accepting shell-style `.conf`
    async fn read_table(path: &Path) -> CacheResult<toml::Table> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CacheError::io(format!("reading config from {}", path.display()), e))?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content).map_err(|e| CacheError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        } else {
            Ok(parse_shell_config(&content))
        }
    }

    /// Ensure the local state directories exist
    pub async fn ensure_state_dirs(config: &Config) -> CacheResult<()> {
        for dir in [config.state_dir(), config.locks_dir()] {
            fs::create_dir_all(&dir).await.map_err(|e| {
                CacheError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlay `overlay` onto `base`, recursing into nested tables
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Parse `S3_CACHE_KEY="value"` lines into config keys; unknown keys are ignored
fn parse_shell_config(content: &str) -> toml::Table {
    let mut table = toml::Table::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        let string = |v: &str| toml::Value::String(v.to_string());

        let (name, parsed) = match key.trim() {
            "S3_CACHE_ENABLED" => ("enabled", toml::Value::Boolean(parse_bool(value))),
            "S3_CACHE_BACKEND" => ("backend", string(&value.to_ascii_lowercase())),
            "S3_CACHE_BUCKET" => ("bucket", string(value)),
            "S3_CACHE_REGION" => ("region", string(value)),
            "S3_CACHE_ENDPOINT" => ("endpoint", string(value)),
            "S3_CACHE_ROOT" => ("root", string(value)),
            "S3_CACHE_PREFIX" => ("prefix", string(value)),
            "S3_CACHE_DEBUG" => ("debug", toml::Value::Boolean(parse_bool(value))),
            "S3_CACHE_TTL" => match value.parse::<i64>() {
                Ok(ttl) => ("ttl_seconds", toml::Value::Integer(ttl)),
                Err(_) => continue,
            },
            "S3_CACHE_PARALLEL_UPLOADS" => match value.parse::<i64>() {
                Ok(n) => ("parallel_uploads", toml::Value::Integer(n)),
                Err(_) => continue,
            },
            _ => continue,
        };
        table.insert(name.to_string(), parsed);
    }

    table
}

/// Apply `MISE_S3_CACHE_*` overrides; unparsable numbers are ignored
pub fn apply_env(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

    if let Some(v) = var("ENABLED") {
        config.enabled = parse_bool(&v);
    }
    if let Some(backend) = var("BACKEND").as_deref().and_then(Backend::parse) {
        config.backend = backend;
    }
    if let Some(v) = var("BUCKET") {
        config.bucket = v;
    }
    if let Some(v) = var("REGION") {
        config.region = v;
    }
    if let Some(v) = var("ENDPOINT") {
        config.endpoint = Some(v).filter(|s| !s.is_empty());
    }
    if let Some(v) = var("ROOT") {
        config.root = Some(PathBuf::from(v));
    }
    if let Some(v) = var("PREFIX") {
        config.prefix = v;
    }
    if let Some(ttl) = var("TTL").and_then(|v| v.parse().ok()) {
        config.ttl_seconds = ttl;
    }
    if let Some(n) = var("PARALLEL_UPLOADS").and_then(|v| v.parse().ok()) {
        config.parallel_uploads = n;
    }
    if let Some(v) = var("DEBUG") {
        config.debug = parse_bool(&v);
    }
    if let Some(v) = var("LOG_FILE") {
        config.log_file = Some(PathBuf::from(v));
    }
    if let Some(v) = var("LOG_FORMAT") {
        config.log_format = v;
    }
    if let Some(v) = var("DIR") {
        config.cache_dir = Some(PathBuf::from(v));
    }
    if let Some(n) = var("LOCK_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.lock_timeout_secs = n;
    }
    if let Some(n) = var("NETWORK_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.network_timeout_secs = n;
    }
    if let Some(n) = var("RETRIES").and_then(|v| v.parse().ok()) {
        config.retries = n;
    }
    if let Some(v) = var("REQUIRE_CHECKSUM") {
        config.require_checksum = parse_bool(&v);
    }
}
