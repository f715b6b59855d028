//! Object storage gateway
//!
//! The cache talks to remote storage only through [`ObjectStore`]. Backends
//! perform no retries of their own; the synchronizer owns the retry and
//! timeout policy.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`S3Store`] | S3 and S3-compatible services (MinIO, R2) |
//! | [`FsStore`] | A directory acting as a bucket (shared mounts, tests) |
//! | [`MemoryStore`] | In-process map with failure injection (tests) |

mod fs;
mod memory;
mod s3;

pub use fs::FsStore;
pub use memory::{FailureMode, MemoryStore, StoreCall};
pub use s3::S3Store;

use crate::config::{Backend, Config};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Result type alias for storage calls
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage call '{operation}' timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("Storage unreachable: {0}")]
    Transport(String),

    #[error("Storage rejected request: {0}")]
    Rejected(String),

    #[error("Storage IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage backend misconfigured: {0}")]
    Config(String),
}

impl StorageError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport(_) => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            Self::NotFound(_) | Self::Rejected(_) | Self::Config(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Listing entry for one stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Abstract object storage interface
///
/// Keys are `/`-separated strings relative to the bucket or root. A missing
/// object is reported by `get_object` as [`StorageError::NotFound`], never as
/// an empty body.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check whether an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Download a whole object
    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Upload a whole object, replacing any previous one
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// List every object whose key starts with `prefix`
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;

    /// Delete one object; deleting a missing object succeeds
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Delete objects under `prefix` last modified before `cutoff`
    ///
    /// Returns the objects actually deleted. A failed delete is logged and
    /// skipped so one stuck object does not block the sweep.
    async fn list_and_delete_older_than(
        &self,
        prefix: &str,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<ObjectInfo>> {
        let mut deleted = Vec::new();
        for object in self.list(prefix).await? {
            if object.last_modified >= cutoff {
                continue;
            }
            match self.delete(&object.key).await {
                Ok(()) => {
                    debug!("Deleted expired object {}", object.key);
                    deleted.push(object);
                }
                Err(e) => warn!("Failed to delete {}: {}", object.key, e),
            }
        }
        Ok(deleted)
    }

    /// Human-readable location, e.g. `s3://bucket (us-east-1)`
    fn describe(&self) -> String;
}

/// Build the backend selected by the configuration
pub async fn connect(config: &Config) -> StorageResult<Arc<dyn ObjectStore>> {
    match config.backend {
        Backend::S3 => Ok(Arc::new(S3Store::connect(config).await?)),
        Backend::Fs => {
            let root = config.root.clone().ok_or_else(|| {
                StorageError::Config("fs backend needs a root directory".to_string())
            })?;
            Ok(Arc::new(FsStore::new(root)))
        }
    }
}

/// Verify read and write access by writing and removing a probe object
pub async fn probe(store: &dyn ObjectStore, prefix: &str) -> StorageResult<()> {
    store.list(prefix).await?;

    let key = format!("{}/test-{}", prefix.trim_end_matches('/'), uuid::Uuid::new_v4());
    store
        .put_object(&key, b"test".to_vec(), "text/plain")
        .await?;

    if let Err(e) = store.delete(&key).await {
        warn!("Failed to remove probe object {}: {}", key, e);
    }
    Ok(())
}
