//! Error types for mise-s3-cache
//!
//! All modules use `CacheResult<T>` as their return type. Storage and archive
//! failures have their own enums and convert into `CacheError` at the edges.

use crate::cache::archive::ArchiveError;
use crate::storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in mise-s3-cache
#[derive(Error, Debug)]
pub enum CacheError {
    // Input validation
    #[error("Invalid {field} '{value}': {reason}")]
    Validation {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    ConfigValue(String),

    #[error("Cache is unavailable: {0}")]
    Unavailable(String),

    // Lock errors
    #[error("Timed out after {waited_secs}s waiting for lock '{name}'")]
    LockTimeout { name: String, waited_secs: u64 },

    // Storage and archive errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a validation error
    pub fn validation(field: &'static str, value: &str, reason: &'static str) -> Self {
        Self::Validation {
            field,
            value: value.to_string(),
            reason,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Check if the error is a rejected tool/version before any I/O
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigValue(_) | Self::Unavailable(_) => {
                Some("Set MISE_S3_CACHE_BUCKET or run: mise-s3-cache status")
            }
            Self::ConfigInvalid { .. } => Some("Fix the file or pass --no-local to skip it"),
            Self::LockTimeout { .. } => {
                Some("Another process is caching this tool; retry later or run: mise-s3-cache cleanup --local-only")
            }
            Self::Storage(e) if e.is_transient() => {
                Some("Check network access and credentials, then run: mise-s3-cache test")
            }
            _ => None,
        }
    }
}
