//! Usage statistics ledger
//!
//! A single JSON document recording cache hits, misses and store outcomes.
//! Updates are read-modify-write under the `stats` lock and land via
//! temp-file rename, so concurrent invocations never interleave writes.
//! Failing to take the lock skips the update rather than blocking.

use super::lock::LockManager;
use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

const STATS_LOCK: &str = "stats";
const STATS_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Restore outcome labels stored in the ledger
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const NOT_FOUND: &str = "not_found";
    pub const DOWNLOAD_FAILED: &str = "download_failed";
    pub const CHECKSUM_MISMATCH: &str = "checksum_mismatch";
    pub const CHECKSUM_MISSING: &str = "checksum_missing";
    pub const EXTRACTION_FAILED: &str = "extraction_failed";
    pub const STORED: &str = "stored";
    pub const UPLOAD_FAILED: &str = "upload_failed";
}

/// Per tool-version counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolVersionStats {
    pub last_used: Option<DateTime<Utc>>,
    pub last_missed: Option<DateTime<Utc>>,
    pub last_stored: Option<DateTime<Utc>>,
    pub hit_count: u64,
    pub miss_count: u64,
    pub total_download_time_ms: u64,
    pub avg_download_time_ms: u64,
    pub status: Option<String>,
    pub store_status: Option<String>,
    pub size_bytes: Option<u64>,
}

/// The whole ledger document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsRecord {
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Restore attempts that reached storage
    pub total_downloads: u64,
    pub total_savings_bytes: u64,
    pub total_uploads: u64,
    pub upload_failures: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub tools: BTreeMap<String, BTreeMap<String, ToolVersionStats>>,
}

impl StatsRecord {
    /// Hits as a percentage of restore attempts
    pub fn hit_rate(&self) -> Option<f64> {
        if self.total_downloads == 0 {
            return None;
        }
        Some(self.cache_hits as f64 / self.total_downloads as f64 * 100.0)
    }

    fn entry(&mut self, tool: &str, version: &str) -> &mut ToolVersionStats {
        self.tools
            .entry(tool.to_string())
            .or_default()
            .entry(version.to_string())
            .or_default()
    }

    /// Record a successful restore
    pub fn apply_hit(&mut self, tool: &str, version: &str, elapsed_ms: u64, size_bytes: u64) {
        self.cache_hits += 1;
        self.total_downloads += 1;
        self.total_savings_bytes += size_bytes;

        let entry = self.entry(tool, version);
        entry.hit_count += 1;
        entry.total_download_time_ms += elapsed_ms;
        entry.avg_download_time_ms = entry.total_download_time_ms / entry.hit_count;
        entry.last_used = Some(Utc::now());
        entry.status = Some(status::SUCCESS.to_string());
        entry.size_bytes = Some(size_bytes);
    }

    /// Record a restore that did not produce a tree
    pub fn apply_miss(&mut self, tool: &str, version: &str, outcome: &str) {
        self.cache_misses += 1;
        self.total_downloads += 1;

        let entry = self.entry(tool, version);
        entry.miss_count += 1;
        entry.last_missed = Some(Utc::now());
        entry.status = Some(outcome.to_string());
    }

    /// Record a store attempt
    pub fn apply_store(&mut self, tool: &str, version: &str, size_bytes: Option<u64>, ok: bool) {
        if ok {
            self.total_uploads += 1;
        } else {
            self.upload_failures += 1;
        }

        let entry = self.entry(tool, version);
        entry.last_stored = Some(Utc::now());
        entry.store_status = Some(
            if ok { status::STORED } else { status::UPLOAD_FAILED }.to_string(),
        );
        if let Some(size) = size_bytes {
            entry.size_bytes = Some(size);
        }
    }
}

/// Persisted ledger with lock-protected updates
#[derive(Debug, Clone)]
pub struct StatsLedger {
    path: PathBuf,
    locks: LockManager,
}

impl StatsLedger {
    pub fn new(path: impl Into<PathBuf>, locks: LockManager) -> Self {
        Self {
            path: path.into(),
            locks,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the ledger; a missing file is an empty ledger
    pub async fn load(&self) -> CacheResult<StatsRecord> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StatsRecord::default()),
            Err(e) => Err(CacheError::io(format!("reading {}", self.path.display()), e)),
        }
    }

    /// Apply `change` to the stored ledger
    ///
    /// Never fails the caller: lock contention and IO problems are logged
    /// and the update is dropped.
    pub async fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut StatsRecord),
    {
        let mut guard = match self.locks.acquire(STATS_LOCK, STATS_LOCK_TIMEOUT).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Skipping stats update: {}", e);
                return;
            }
        };

        if let Err(e) = self.apply(change).await {
            warn!("Failed to update stats: {}", e);
        }
        guard.release();
    }

    async fn apply<F>(&self, change: F) -> CacheResult<()>
    where
        F: FnOnce(&mut StatsRecord),
    {
        let mut record = match self.load().await {
            Ok(record) => record,
            Err(CacheError::Json(e)) => {
                let kept = self.quarantine().await?;
                warn!(
                    "Stats file is corrupt ({}); moved to {}, starting fresh",
                    e,
                    kept.display()
                );
                StatsRecord::default()
            }
            Err(e) => return Err(e),
        };

        change(&mut record);
        record.updated_at = Some(Utc::now());
        self.write(&record).await
    }

    /// Move an unparseable ledger aside so its counters can be recovered
    async fn quarantine(&self) -> CacheResult<PathBuf> {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(
            ".corrupt-{}-{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        ));
        let kept = self.path.with_file_name(name);
        fs::rename(&self.path, &kept)
            .await
            .map_err(|e| CacheError::io(format!("moving aside {}", self.path.display()), e))?;
        Ok(kept)
    }

    async fn write(&self, record: &StatsRecord) -> CacheResult<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| CacheError::Internal("stats path has no parent".to_string()))?;
        fs::create_dir_all(dir)
            .await
            .map_err(|e| CacheError::io(format!("creating {}", dir.display()), e))?;

        let json = serde_json::to_string_pretty(record)?;
        let tmp = dir.join(format!(".stats.json.tmp-{}", uuid::Uuid::new_v4()));
        fs::write(&tmp, json)
            .await
            .map_err(|e| CacheError::io(format!("writing {}", tmp.display()), e))?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::io(format!("replacing {}", self.path.display()), e));
        }

        debug!("Stats written to {}", self.path.display());
        Ok(())
    }
}
