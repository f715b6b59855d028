//! Cache synchronizer
//!
//! Implements the check/restore/store/cleanup protocol against an
//! [`ObjectStore`]. Storage problems never escape as errors from the hot
//! paths: they degrade to a miss or a skipped store so a tool installation
//! can always fall back to upstream. Only invalid input is an `Err`.
//!
//! # Store ordering
//!
//! The checksum object is written before the archive and the metadata last.
//! A store that dies midway leaves either no archive (a miss) or an archive
//! whose checksum is already in place.

use super::archive::{self, ArchiveError};
use super::key::{tools_prefix, CacheKey, HostPlatform, ToolVersionRef};
use super::lock::LockManager;
use super::stats::{status, StatsLedger, StatsRecord};
use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::mise::ToolManager;
use crate::project::ProjectScope;
use crate::storage::{self, ObjectStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";
const TEXT_CONTENT_TYPE: &str = "text/plain";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Result of a restore attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The destination now holds the cached tree
    Restored { size_bytes: u64, elapsed_ms: u64 },
    /// No entry exists for this key
    Miss,
    /// Storage is not configured or could not be reached
    Unavailable,
    /// The archive did not match its checksum; destination untouched
    IntegrityFailure,
    /// The archive could not be unpacked; destination untouched
    ExtractionFailure,
}

impl RestoreOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, Self::Restored { .. })
    }
}

/// Why a store did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The project does not declare this tool version
    NotDeclared,
    /// Storage is not configured
    Unavailable,
    /// An entry already exists and overwrite was not requested
    AlreadyCached,
}

/// Result of a store attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored { size_bytes: u64 },
    Skipped(SkipReason),
    /// Another writer held the key's lock for too long
    LockTimeout,
    /// The install directory does not exist
    SourceMissing,
    UploadFailure(String),
}

/// Knobs for [`CacheSynchronizer::store_with`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    /// Store even when the project does not declare the tool version
    pub ignore_scope: bool,
    /// Replace an existing entry
    pub overwrite: bool,
}

/// Contents of `metadata.json` next to each archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub tool: String,
    pub version: String,
    pub platform: String,
    pub arch: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub checksum: String,
    pub tool_manager_version: String,
    pub compression: String,
}

/// Result of a remote cleanup sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub objects_removed: usize,
    pub entries_removed: usize,
}

/// Result of a local state cleanup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalCleanupReport {
    pub locks_removed: usize,
    pub temp_files_removed: usize,
}

/// Remote footprint under the configured prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteUsage {
    pub objects: usize,
    pub entries: usize,
    pub total_bytes: u64,
}

/// Cache and install state of one project tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub tool: ToolVersionRef,
    pub cached: bool,
    pub installed: bool,
}

/// What warming did for one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmAction {
    /// Installed and cached already
    UpToDate,
    /// Pulled from the cache into the install directory
    Restored,
    /// Uploaded an existing installation
    Stored,
    /// Installed from upstream, then uploaded
    InstalledAndStored,
    Failed(String),
}

/// Aggregate result of [`CacheSynchronizer::warm`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
    pub results: Vec<(ToolVersionRef, WarmAction)>,
}

impl WarmReport {
    pub fn count(&self, wanted: fn(&WarmAction) -> bool) -> usize {
        self.results.iter().filter(|(_, a)| wanted(a)).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ToolVersionRef, &str)> {
        self.results.iter().filter_map(|(tool, action)| match action {
            WarmAction::Failed(reason) => Some((tool, reason.as_str())),
            _ => None,
        })
    }
}

/// Coordinates storage, locks, integrity checks and the stats ledger
pub struct CacheSynchronizer {
    config: Arc<Config>,
    store: Option<Arc<dyn ObjectStore>>,
    unavailable_reason: Option<String>,
    scope: Arc<dyn ProjectScope>,
    manager: Arc<dyn ToolManager>,
    locks: LockManager,
    stats: StatsLedger,
    host: HostPlatform,
    manager_version: OnceCell<String>,
    retry_base: Duration,
}

impl CacheSynchronizer {
    /// Build a synchronizer over an explicit store (`None` means unavailable)
    pub fn new(
        config: Config,
        store: Option<Arc<dyn ObjectStore>>,
        scope: Arc<dyn ProjectScope>,
        manager: Arc<dyn ToolManager>,
    ) -> Self {
        let locks = LockManager::new(config.locks_dir());
        let stats = StatsLedger::new(config.stats_path(), locks.clone());
        let unavailable_reason = store
            .is_none()
            .then(|| "no storage backend configured".to_string());

        Self {
            config: Arc::new(config),
            store,
            unavailable_reason,
            scope,
            manager,
            locks,
            stats,
            host: HostPlatform::current(),
            manager_version: OnceCell::new(),
            retry_base: Duration::from_millis(200),
        }
    }

    /// Validate the configuration and connect to its backend
    ///
    /// A disabled, invalid or unreachable configuration yields an
    /// unavailable synchronizer instead of an error.
    pub async fn connect(
        config: Config,
        scope: Arc<dyn ProjectScope>,
        manager: Arc<dyn ToolManager>,
    ) -> Self {
        let store = match config.validate() {
            Ok(()) => match storage::connect(&config).await {
                Ok(store) => Ok(store),
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };

        match store {
            Ok(store) => Self::new(config, Some(store), scope, manager),
            Err(reason) => {
                debug!("Cache unavailable: {}", reason);
                let mut sync = Self::new(config, None, scope, manager);
                sync.unavailable_reason = Some(reason);
                sync
            }
        }
    }

    pub fn with_host(mut self, host: HostPlatform) -> Self {
        self.host = host;
        self
    }

    /// Override how often lock waiters poll
    pub fn with_lock_poll_interval(mut self, interval: Duration) -> Self {
        self.locks = self.locks.with_poll_interval(interval);
        self.stats = StatsLedger::new(self.config.stats_path(), self.locks.clone());
        self
    }

    /// Override the first retry delay
    pub fn with_retry_base(mut self, delay: Duration) -> Self {
        self.retry_base = delay;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn host(&self) -> &HostPlatform {
        &self.host
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    /// Human-readable storage location
    pub fn describe_store(&self) -> Option<String> {
        self.store.as_ref().map(|s| s.describe())
    }

    /// Derive the key for a tool version on this host
    pub fn key_for(&self, tool: &str, version: &str) -> CacheResult<CacheKey> {
        CacheKey::derive(&self.config.prefix, tool, version, &self.host)
    }

    fn backend(&self) -> CacheResult<&dyn ObjectStore> {
        self.store.as_deref().ok_or_else(|| {
            CacheError::Unavailable(
                self.unavailable_reason
                    .clone()
                    .unwrap_or_else(|| "no storage backend".to_string()),
            )
        })
    }

    async fn manager_version(&self) -> &str {
        self.manager_version
            .get_or_init(|| self.manager.version())
            .await
    }

    /// Run one storage call under the timeout and retry policy
    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> StorageResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let timeout = self.config.network_timeout();
        let mut delay = self.retry_base;
        let mut attempt = 0;

        loop {
            let result = match tokio::time::timeout(timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(StorageError::Timeout {
                    operation,
                    secs: timeout.as_secs(),
                }),
            };

            match result {
                Err(e) if e.is_transient() && attempt < self.config.retries => {
                    attempt += 1;
                    debug!(operation, attempt, "Retrying after transient error: {}", e);
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                other => return other,
            }
        }
    }

    /// Whether an entry exists for this tool version
    ///
    /// Connectivity problems read as "not cached".
    pub async fn check(&self, tool: &str, version: &str) -> CacheResult<bool> {
        let key = self.key_for(tool, version)?;
        let Ok(store) = self.backend() else {
            return Ok(false);
        };

        let archive_key = key.archive_object();
        match self.call("head", || store.exists(&archive_key)).await {
            Ok(found) => {
                debug!(%key, found, "Checked cache");
                Ok(found)
            }
            Err(e) => {
                warn!("Cache check for {} failed: {}", key.tool_ref(), e);
                Ok(false)
            }
        }
    }

    /// Restore a cached tree into `dest`
    pub async fn restore(&self, tool: &str, version: &str, dest: &Path) -> CacheResult<RestoreOutcome> {
        let key = self.key_for(tool, version)?;
        let Ok(store) = self.backend() else {
            return Ok(RestoreOutcome::Unavailable);
        };
        let started = Instant::now();

        let archive_key = key.archive_object();
        let bytes = match self.call("get", || store.get_object(&archive_key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                debug!(%key, "Cache miss");
                self.record_miss(&key, status::NOT_FOUND).await;
                return Ok(RestoreOutcome::Miss);
            }
            Err(e) => {
                warn!("Failed to download {}: {}", key.tool_ref(), e);
                self.record_miss(&key, status::DOWNLOAD_FAILED).await;
                return Ok(RestoreOutcome::Unavailable);
            }
        };

        let checksum_key = key.checksum_object();
        let expected = match self.call("get", || store.get_object(&checksum_key)).await {
            Ok(body) => match parse_checksum(&body) {
                Some(expected) => Some(expected),
                None => {
                    warn!("Rejecting {}: checksum object is malformed", key.tool_ref());
                    self.record_miss(&key, status::CHECKSUM_MISMATCH).await;
                    return Ok(RestoreOutcome::IntegrityFailure);
                }
            },
            Err(e) if e.is_not_found() => {
                if self.config.require_checksum {
                    warn!("Rejecting {}: entry has no checksum", key.tool_ref());
                    self.record_miss(&key, status::CHECKSUM_MISSING).await;
                    return Ok(RestoreOutcome::IntegrityFailure);
                }
                warn!("Entry for {} has no checksum; trusting it", key.tool_ref());
                None
            }
            Err(e) => {
                warn!("Failed to download checksum for {}: {}", key.tool_ref(), e);
                self.record_miss(&key, status::DOWNLOAD_FAILED).await;
                return Ok(RestoreOutcome::Unavailable);
            }
        };

        let size_bytes = bytes.len() as u64;
        let dest_owned = dest.to_path_buf();
        let result = tokio::task::spawn_blocking(move || -> Result<(), RestoreFailure> {
            let actual = archive::sha256_hex(&bytes);
            if let Some(expected) = expected {
                if expected != actual {
                    return Err(RestoreFailure::Mismatch { expected, actual });
                }
            }
            archive::unpack(&bytes, &dest_owned)
                .map(|_| ())
                .map_err(RestoreFailure::Extract)
        })
        .await
        .unwrap_or_else(|e| Err(RestoreFailure::Join(e.to_string())));

        match result {
            Ok(()) => {
                let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(
                    "Restored {} from cache ({} bytes, {} ms)",
                    key.tool_ref(),
                    size_bytes,
                    elapsed_ms
                );
                let tool_ref = key.tool_ref().clone();
                self.stats
                    .update(|r| r.apply_hit(tool_ref.tool(), tool_ref.version(), elapsed_ms, size_bytes))
                    .await;
                Ok(RestoreOutcome::Restored {
                    size_bytes,
                    elapsed_ms,
                })
            }
            Err(RestoreFailure::Mismatch { expected, actual }) => {
                warn!(
                    "Checksum mismatch for {}: expected {}, got {}",
                    key.tool_ref(),
                    expected,
                    actual
                );
                self.record_miss(&key, status::CHECKSUM_MISMATCH).await;
                Ok(RestoreOutcome::IntegrityFailure)
            }
            Err(RestoreFailure::Extract(e)) => {
                warn!("Failed to extract {}: {}", key.tool_ref(), e);
                self.record_miss(&key, status::EXTRACTION_FAILED).await;
                Ok(RestoreOutcome::ExtractionFailure)
            }
            Err(RestoreFailure::Join(e)) => {
                warn!("Extraction task for {} failed: {}", key.tool_ref(), e);
                self.record_miss(&key, status::EXTRACTION_FAILED).await;
                Ok(RestoreOutcome::ExtractionFailure)
            }
        }
    }

    async fn record_miss(&self, key: &CacheKey, outcome: &str) {
        let tool = key.tool_ref();
        self.stats
            .update(|r| r.apply_miss(tool.tool(), tool.version(), outcome))
            .await;
    }

    /// Store `source` for this tool version with default options
    pub async fn store(&self, tool: &str, version: &str, source: &Path) -> CacheResult<StoreOutcome> {
        self.store_with(tool, version, source, StoreOptions::default())
            .await
    }

    /// Store `source` for this tool version
    pub async fn store_with(
        &self,
        tool: &str,
        version: &str,
        source: &Path,
        options: StoreOptions,
    ) -> CacheResult<StoreOutcome> {
        let key = self.key_for(tool, version)?;

        if !options.ignore_scope && !self.scope.is_declared(tool, version).await {
            debug!("{} is not declared by the project; not storing", key.tool_ref());
            return Ok(StoreOutcome::Skipped(SkipReason::NotDeclared));
        }

        let Ok(store) = self.backend() else {
            return Ok(StoreOutcome::Skipped(SkipReason::Unavailable));
        };

        if !source.is_dir() {
            warn!("Install directory {} does not exist", source.display());
            return Ok(StoreOutcome::SourceMissing);
        }

        let lock_name = key.as_path();
        let mut guard = match self.locks.acquire(&lock_name, self.config.lock_timeout()).await {
            Ok(guard) => guard,
            Err(CacheError::LockTimeout { waited_secs, .. }) => {
                warn!(
                    "Gave up storing {} after waiting {}s for another writer",
                    key.tool_ref(),
                    waited_secs
                );
                return Ok(StoreOutcome::LockTimeout);
            }
            Err(e) => {
                warn!("Cannot lock {}: {}", key.tool_ref(), e);
                return Ok(StoreOutcome::UploadFailure(e.to_string()));
            }
        };

        let outcome = self.store_locked(store, &key, source, options).await;
        guard.release();

        let tool_ref = key.tool_ref();
        match &outcome {
            StoreOutcome::Stored { size_bytes } => {
                info!("Stored {} in cache ({} bytes)", tool_ref, size_bytes);
                let size = *size_bytes;
                self.stats
                    .update(|r| r.apply_store(tool_ref.tool(), tool_ref.version(), Some(size), true))
                    .await;
            }
            StoreOutcome::UploadFailure(reason) => {
                warn!("Failed to store {}: {}", tool_ref, reason);
                self.stats
                    .update(|r| r.apply_store(tool_ref.tool(), tool_ref.version(), None, false))
                    .await;
            }
            StoreOutcome::Skipped(SkipReason::AlreadyCached) => {
                debug!("{} is already cached", tool_ref);
            }
            _ => {}
        }

        Ok(outcome)
    }

    async fn store_locked(
        &self,
        store: &dyn ObjectStore,
        key: &CacheKey,
        source: &Path,
        options: StoreOptions,
    ) -> StoreOutcome {
        let archive_key = key.archive_object();

        if !options.overwrite {
            match self.call("head", || store.exists(&archive_key)).await {
                Ok(true) => return StoreOutcome::Skipped(SkipReason::AlreadyCached),
                Ok(false) => {}
                Err(e) => return StoreOutcome::UploadFailure(e.to_string()),
            }
        }

        let source_owned = source.to_path_buf();
        let root_name = key.archive_root();
        let packed = match tokio::task::spawn_blocking(move || archive::pack(&source_owned, &root_name)).await {
            Ok(Ok(packed)) => packed,
            Ok(Err(ArchiveError::SourceMissing(_))) => return StoreOutcome::SourceMissing,
            Ok(Err(e)) => return StoreOutcome::UploadFailure(e.to_string()),
            Err(e) => return StoreOutcome::UploadFailure(format!("packing task failed: {e}")),
        };

        let metadata = EntryMetadata {
            tool: key.tool_ref().tool().to_string(),
            version: key.tool_ref().version().to_string(),
            platform: key.host().platform.clone(),
            arch: key.host().arch.clone(),
            created_at: Utc::now(),
            size_bytes: packed.size_bytes,
            checksum: packed.checksum.clone(),
            tool_manager_version: self.manager_version().await.to_string(),
            compression: self.config.compression.clone(),
        };
        let metadata_json = match serde_json::to_vec_pretty(&metadata) {
            Ok(json) => json,
            Err(e) => return StoreOutcome::UploadFailure(e.to_string()),
        };

        let checksum_key = key.checksum_object();
        let checksum_body = format!("{}  {}.tar.gz\n", packed.checksum, key.archive_root());
        let metadata_key = key.metadata_object();

        let uploads = async {
            self.call("put", || {
                store.put_object(&checksum_key, checksum_body.clone().into_bytes(), TEXT_CONTENT_TYPE)
            })
            .await?;
            self.call("put", || {
                store.put_object(&archive_key, packed.bytes.clone(), ARCHIVE_CONTENT_TYPE)
            })
            .await?;
            self.call("put", || {
                store.put_object(&metadata_key, metadata_json.clone(), JSON_CONTENT_TYPE)
            })
            .await
        };

        match uploads.await {
            Ok(()) => StoreOutcome::Stored {
                size_bytes: packed.size_bytes,
            },
            Err(e) => StoreOutcome::UploadFailure(e.to_string()),
        }
    }

    /// Delete remote objects older than `max_age_days`
    pub async fn cleanup(&self, max_age_days: u32) -> CacheResult<CleanupReport> {
        let store = self.backend()?;
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(max_age_days));
        let prefix = tools_prefix(&self.config.prefix);

        info!("Removing cache objects under {} older than {}", prefix, cutoff);
        let deleted = store.list_and_delete_older_than(&prefix, cutoff).await?;

        let entries: BTreeSet<&str> = deleted
            .iter()
            .filter_map(|o| o.key.rsplit_once('/').map(|(dir, _)| dir))
            .collect();

        Ok(CleanupReport {
            objects_removed: deleted.len(),
            entries_removed: entries.len(),
        })
    }

    /// Remove stale lock files and abandoned temp files from the state dir
    pub async fn cleanup_local(&self) -> CacheResult<LocalCleanupReport> {
        let locks_removed = self.locks.cleanup_stale().await?;

        let state_dir = self.config.state_dir();
        let mut temp_files_removed = 0;
        let mut entries = match tokio::fs::read_dir(&state_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LocalCleanupReport {
                    locks_removed,
                    temp_files_removed,
                })
            }
            Err(e) => return Err(CacheError::io(format!("reading {}", state_dir.display()), e)),
        };

        // In-flight temp files are young; only sweep ones clearly abandoned
        let max_age = Duration::from_secs(3600);
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(format!("reading {}", state_dir.display()), e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.contains(".tmp-") {
                continue;
            }
            let abandoned = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|m| SystemTime::now().duration_since(m).ok())
                .is_some_and(|age| age >= max_age);
            if abandoned && tokio::fs::remove_file(entry.path()).await.is_ok() {
                temp_files_removed += 1;
            }
        }

        Ok(LocalCleanupReport {
            locks_removed,
            temp_files_removed,
        })
    }

    /// Count objects, entries and bytes under the prefix
    pub async fn usage(&self) -> CacheResult<RemoteUsage> {
        let store = self.backend()?;
        let prefix = tools_prefix(&self.config.prefix);
        let objects = self.call("list", || store.list(&prefix)).await?;

        let entries: BTreeSet<&str> = objects
            .iter()
            .filter(|o| o.key.ends_with(".tar.gz"))
            .filter_map(|o| o.key.rsplit_once('/').map(|(dir, _)| dir))
            .collect();

        Ok(RemoteUsage {
            objects: objects.len(),
            entries: entries.len(),
            total_bytes: objects.iter().map(|o| o.size).sum(),
        })
    }

    /// Verify read and write access to the backend
    pub async fn test_connectivity(&self) -> CacheResult<()> {
        let store = self.backend()?;
        let timeout = self.config.network_timeout();
        match tokio::time::timeout(timeout * 3, storage::probe(store, &self.config.prefix)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StorageError::Timeout {
                operation: "probe",
                secs: (timeout * 3).as_secs(),
            }
            .into()),
        }
    }

    pub async fn stats(&self) -> CacheResult<StatsRecord> {
        self.stats.load().await
    }

    pub fn stats_path(&self) -> &Path {
        self.stats.path()
    }

    /// Tool versions the project declares
    pub async fn project_tools(&self) -> CacheResult<Vec<ToolVersionRef>> {
        self.scope.tools().await
    }

    /// Where the tool manager installs this tool version
    pub async fn install_path(&self, tool: &ToolVersionRef) -> PathBuf {
        self.manager.install_path(tool).await
    }

    /// Cache and install state for every project tool
    pub async fn analyze(&self) -> CacheResult<Vec<ToolStatus>> {
        self.backend()?;
        let tools = self.project_tools().await?;

        Ok(stream::iter(tools)
            .map(|tool| async move {
                let cached = self
                    .check(tool.tool(), tool.version())
                    .await
                    .unwrap_or(false);
                let installed = is_installed(&self.manager.install_path(&tool).await).await;
                ToolStatus {
                    tool,
                    cached,
                    installed,
                }
            })
            .buffered(self.config.parallel_uploads.max(1))
            .collect()
            .await)
    }

    /// Bring every project tool to "installed and cached"
    pub async fn warm(&self, parallel: usize) -> CacheResult<WarmReport> {
        self.backend()?;
        let tools = self.project_tools().await?;
        info!("Warming cache for {} tool(s)", tools.len());

        let results = stream::iter(tools)
            .map(|tool| async move {
                let action = self.warm_one(&tool).await;
                (tool, action)
            })
            .buffer_unordered(parallel.max(1))
            .collect::<Vec<_>>()
            .await;

        Ok(WarmReport { results })
    }

    async fn warm_one(&self, tool: &ToolVersionRef) -> WarmAction {
        let install_path = self.manager.install_path(tool).await;
        let installed = is_installed(&install_path).await;
        let cached = self
            .check(tool.tool(), tool.version())
            .await
            .unwrap_or(false);

        match (installed, cached) {
            (true, true) => WarmAction::UpToDate,
            (false, true) => match self.restore(tool.tool(), tool.version(), &install_path).await {
                Ok(RestoreOutcome::Restored { .. }) => WarmAction::Restored,
                Ok(other) => WarmAction::Failed(format!("restore: {other:?}")),
                Err(e) => WarmAction::Failed(e.to_string()),
            },
            (true, false) => self.warm_store(tool, &install_path, WarmAction::Stored).await,
            (false, false) => {
                info!("Installing {}", tool);
                if let Err(e) = self.manager.install(tool).await {
                    return WarmAction::Failed(e.to_string());
                }
                let install_path = self.manager.install_path(tool).await;
                self.warm_store(tool, &install_path, WarmAction::InstalledAndStored)
                    .await
            }
        }
    }

    async fn warm_store(&self, tool: &ToolVersionRef, path: &Path, success: WarmAction) -> WarmAction {
        let options = StoreOptions {
            ignore_scope: true,
            overwrite: false,
        };
        match self.store_with(tool.tool(), tool.version(), path, options).await {
            Ok(StoreOutcome::Stored { .. }) | Ok(StoreOutcome::Skipped(SkipReason::AlreadyCached)) => {
                success
            }
            Ok(other) => WarmAction::Failed(format!("store: {other:?}")),
            Err(e) => WarmAction::Failed(e.to_string()),
        }
    }
}

enum RestoreFailure {
    Mismatch { expected: String, actual: String },
    Extract(ArchiveError),
    Join(String),
}

/// SHA-256 hex digest leading a checksum object, lowercased
///
/// `None` unless the first token is exactly 64 hex digits.
fn parse_checksum(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let token = text.split_whitespace().next()?;
    if token.len() == 64 && token.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(token.to_ascii_lowercase())
    } else {
        None
    }
}

/// An install directory counts when it exists and is not empty
pub async fn is_installed(path: &Path) -> bool {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FailureMode, MemoryStore, StoreCall};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Declared(Vec<(String, String)>);

    impl Declared {
        fn of(tools: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self(
                tools
                    .iter()
                    .map(|(t, v)| (t.to_string(), v.to_string()))
                    .collect(),
            ))
        }
    }

    #[async_trait]
    impl ProjectScope for Declared {
        async fn is_declared(&self, tool: &str, version: &str) -> bool {
            self.0.iter().any(|(t, v)| t == tool && v == version)
        }

        async fn tools(&self) -> CacheResult<Vec<ToolVersionRef>> {
            self.0
                .iter()
                .map(|(t, v)| ToolVersionRef::new(t, v))
                .collect()
        }
    }

    /// Installs tools by writing a marker tree under `root`
    struct FakeMise {
        root: PathBuf,
        installs: AtomicUsize,
    }

    #[async_trait]
    impl ToolManager for FakeMise {
        async fn version(&self) -> String {
            "2024.12.0".to_string()
        }

        async fn install_path(&self, tool: &ToolVersionRef) -> PathBuf {
            self.root.join(tool.tool()).join(tool.version())
        }

        async fn install(&self, tool: &ToolVersionRef) -> CacheResult<()> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            let path = self.install_path(tool).await;
            write_tree(&path, tool.version());
            Ok(())
        }
    }

    struct Fixture {
        temp: TempDir,
        store: Arc<MemoryStore>,
        mise: Arc<FakeMise>,
        sync: CacheSynchronizer,
    }

    fn write_tree(path: &Path, marker: &str) {
        std::fs::create_dir_all(path.join("bin")).unwrap();
        std::fs::write(path.join("bin/tool"), format!("#!/bin/sh\necho {marker}\n")).unwrap();
        std::fs::create_dir_all(path.join("lib/deep/nested")).unwrap();
        std::fs::write(path.join("lib/deep/nested/data.txt"), marker).unwrap();
    }

    fn fixture_with(declared: &[(&str, &str)], tweak: impl FnOnce(&mut Config)) -> Fixture {
        let temp = TempDir::new().unwrap();
        let mut config = Config {
            bucket: "test-bucket".into(),
            cache_dir: Some(temp.path().join("state")),
            network_timeout_secs: 1,
            retries: 2,
            lock_timeout_secs: 5,
            ..Default::default()
        };
        tweak(&mut config);

        let store = Arc::new(MemoryStore::new());
        let mise = Arc::new(FakeMise {
            root: temp.path().join("installs"),
            installs: AtomicUsize::new(0),
        });
        let sync = CacheSynchronizer::new(
            config,
            Some(store.clone() as Arc<dyn ObjectStore>),
            Declared::of(declared),
            mise.clone(),
        )
        .with_host(HostPlatform::new("linux", "x86_64"))
        .with_lock_poll_interval(Duration::from_millis(50))
        .with_retry_base(Duration::from_millis(5));

        Fixture {
            temp,
            store,
            mise,
            sync,
        }
    }

    fn fixture(declared: &[(&str, &str)]) -> Fixture {
        fixture_with(declared, |_| {})
    }

    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[tokio::test]
    async fn invalid_input_makes_no_calls() {
        let f = fixture(&[("node;rm", "1.0")]);
        let dest = f.temp.path().join("dest");

        assert!(f.sync.check("node;rm", "1.0").await.unwrap_err().is_validation());
        assert!(f.sync.restore("node", "../../x", &dest).await.unwrap_err().is_validation());
        assert!(f.sync.store("", "1.0", &dest).await.unwrap_err().is_validation());
        assert_eq!(f.store.total_calls(), 0);
    }

    #[tokio::test]
    async fn cold_cache_then_warm() {
        let f = fixture(&[("node", "20.11.0")]);
        let install = f.temp.path().join("installs/node/20.11.0");

        assert!(!f.sync.check("node", "20.11.0").await.unwrap());
        assert_eq!(
            f.sync.restore("node", "20.11.0", &install).await.unwrap(),
            RestoreOutcome::Miss
        );
        assert!(!install.exists());

        write_tree(&install, "v20");
        let stored = f.sync.store("node", "20.11.0", &install).await.unwrap();
        assert!(matches!(stored, StoreOutcome::Stored { .. }));
        assert!(f.sync.check("node", "20.11.0").await.unwrap());

        let other_machine = f.temp.path().join("elsewhere/node/20.11.0");
        let restored = f.sync.restore("node", "20.11.0", &other_machine).await.unwrap();
        assert!(restored.is_restored());
        assert_eq!(
            std::fs::read_to_string(other_machine.join("lib/deep/nested/data.txt")).unwrap(),
            "v20"
        );

        let stats = f.sync.stats().await.unwrap();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.total_uploads, 1);
        assert_eq!(stats.tools["node"]["20.11.0"].status.as_deref(), Some("success"));
    }

    #[tokio::test]
    async fn entry_layout_and_metadata() {
        let f = fixture(&[("go", "1.22.0")]);
        let install = f.temp.path().join("go");
        write_tree(&install, "go");
        f.sync.store("go", "1.22.0", &install).await.unwrap();

        let base = "mise-cache/tools/go/1.22.0/linux-x86_64";
        let mut keys = f.store.keys();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                format!("{base}/go-1.22.0.tar.gz"),
                format!("{base}/go-1.22.0.tar.gz.sha256"),
                format!("{base}/metadata.json"),
            ]
        );

        let archive = f.store.peek(&format!("{base}/go-1.22.0.tar.gz")).unwrap();
        let checksum = f.store.peek(&format!("{base}/go-1.22.0.tar.gz.sha256")).unwrap();
        assert_eq!(parse_checksum(&checksum).unwrap(), archive::sha256_hex(&archive));

        let meta: EntryMetadata =
            serde_json::from_slice(&f.store.peek(&format!("{base}/metadata.json")).unwrap()).unwrap();
        assert_eq!(meta.tool, "go");
        assert_eq!(meta.platform, "linux");
        assert_eq!(meta.arch, "x86_64");
        assert_eq!(meta.checksum, archive::sha256_hex(&archive));
        assert_eq!(meta.size_bytes, archive.len() as u64);
        assert_eq!(meta.tool_manager_version, "2024.12.0");
        assert_eq!(meta.compression, "gzip");
    }

    #[tokio::test]
    async fn restore_is_idempotent() {
        let f = fixture(&[("deno", "1.40.0")]);
        let install = f.temp.path().join("src");
        write_tree(&install, "deno");
        f.sync.store("deno", "1.40.0", &install).await.unwrap();

        let dest = f.temp.path().join("dest");
        assert!(f.sync.restore("deno", "1.40.0", &dest).await.unwrap().is_restored());
        let first = std::fs::read(dest.join("bin/tool")).unwrap();
        assert!(f.sync.restore("deno", "1.40.0", &dest).await.unwrap().is_restored());
        assert_eq!(std::fs::read(dest.join("bin/tool")).unwrap(), first);
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn tampered_archive_is_rejected() {
        let f = fixture(&[("node", "18.0.0")]);
        let install = f.temp.path().join("src");
        write_tree(&install, "genuine");
        f.sync.store("node", "18.0.0", &install).await.unwrap();

        let key = f.sync.key_for("node", "18.0.0").unwrap();
        let other = f.temp.path().join("other");
        write_tree(&other, "evil");
        let forged = archive::pack(&other, &key.archive_root()).unwrap();
        f.store.overwrite(&key.archive_object(), forged.bytes);

        let fresh = f.temp.path().join("fresh");
        assert_eq!(
            f.sync.restore("node", "18.0.0", &fresh).await.unwrap(),
            RestoreOutcome::IntegrityFailure
        );
        assert!(!fresh.exists());

        let existing = f.temp.path().join("existing");
        write_tree(&existing, "previous");
        assert_eq!(
            f.sync.restore("node", "18.0.0", &existing).await.unwrap(),
            RestoreOutcome::IntegrityFailure
        );
        assert_eq!(
            std::fs::read_to_string(existing.join("lib/deep/nested/data.txt")).unwrap(),
            "previous"
        );

        let stats = f.sync.stats().await.unwrap();
        assert_eq!(
            stats.tools["node"]["18.0.0"].status.as_deref(),
            Some("checksum_mismatch")
        );
    }

    #[tokio::test]
    async fn missing_checksum_is_trusted_unless_required() {
        let f = fixture(&[("ruby", "3.3.0")]);
        let install = f.temp.path().join("src");
        write_tree(&install, "ruby");
        f.sync.store("ruby", "3.3.0", &install).await.unwrap();
        let key = f.sync.key_for("ruby", "3.3.0").unwrap();
        f.store.remove(&key.checksum_object());

        let dest = f.temp.path().join("dest");
        assert!(f.sync.restore("ruby", "3.3.0", &dest).await.unwrap().is_restored());

        let strict = fixture_with(&[], |c| c.require_checksum = true);
        for object in f.store.keys() {
            strict.store.overwrite(&object, f.store.peek(&object).unwrap());
        }
        let strict_dest = strict.temp.path().join("dest");
        assert_eq!(
            strict.sync.restore("ruby", "3.3.0", &strict_dest).await.unwrap(),
            RestoreOutcome::IntegrityFailure
        );
        assert!(!strict_dest.exists());
    }

    #[tokio::test]
    async fn unreadable_checksum_is_integrity_failure() {
        let bodies: [&[u8]; 4] = [b"", b"\n", b"   \t\n", b"not-a-digest  x.tar.gz\n"];
        for require_checksum in [false, true] {
            for body in bodies {
                let f = fixture_with(&[("deno", "1.40.0")], |c| c.require_checksum = require_checksum);
                let install = f.temp.path().join("src");
                write_tree(&install, "genuine");
                f.sync.store("deno", "1.40.0", &install).await.unwrap();

                let key = f.sync.key_for("deno", "1.40.0").unwrap();
                let other = f.temp.path().join("other");
                write_tree(&other, "evil");
                let forged = archive::pack(&other, &key.archive_root()).unwrap();
                f.store.overwrite(&key.archive_object(), forged.bytes);
                f.store.overwrite(&key.checksum_object(), body.to_vec());

                let dest = f.temp.path().join("dest");
                assert_eq!(
                    f.sync.restore("deno", "1.40.0", &dest).await.unwrap(),
                    RestoreOutcome::IntegrityFailure,
                    "accepted checksum body {body:?} (require_checksum = {require_checksum})"
                );
                assert!(!dest.exists());

                let stats = f.sync.stats().await.unwrap();
                assert_eq!(
                    stats.tools["deno"]["1.40.0"].status.as_deref(),
                    Some("checksum_mismatch")
                );
            }
        }
    }

    #[tokio::test]
    async fn corrupt_archive_is_extraction_failure() {
        let f = fixture(&[]);
        let key = f.sync.key_for("zig", "0.11.0").unwrap();
        f.store.overwrite(&key.archive_object(), b"garbage".to_vec());

        let dest = f.temp.path().join("dest");
        assert_eq!(
            f.sync.restore("zig", "0.11.0", &dest).await.unwrap(),
            RestoreOutcome::ExtractionFailure
        );
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn storage_outage_degrades() {
        let f = fixture(&[("node", "20.0.0")]);
        let install = f.temp.path().join("src");
        write_tree(&install, "x");
        f.store.set_failure(FailureMode::Unreachable);

        assert!(!f.sync.check("node", "20.0.0").await.unwrap());
        assert_eq!(
            f.sync.restore("node", "20.0.0", &f.temp.path().join("dest")).await.unwrap(),
            RestoreOutcome::Unavailable
        );
        assert!(matches!(
            f.sync.store("node", "20.0.0", &install).await.unwrap(),
            StoreOutcome::UploadFailure(_)
        ));
        // One call plus two retries for each of the three operations
        assert_eq!(f.store.total_calls(), 9);

        let stats = f.sync.stats().await.unwrap();
        assert_eq!(stats.upload_failures, 1);
        assert_eq!(stats.tools["node"]["20.0.0"].status.as_deref(), Some("download_failed"));
    }

    #[tokio::test]
    async fn hung_storage_times_out() {
        let f = fixture_with(&[], |c| c.retries = 0);
        let started = Instant::now();
        assert!(!f.sync.check("node", "20.0.0").await.unwrap());
        f.store.set_failure(FailureMode::Hang);
        assert!(!f.sync.check("node", "20.0.0").await.unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let f = fixture(&[]);
        let key = f.sync.key_for("node", "1.0.0").unwrap();
        f.store.overwrite(&key.archive_object(), vec![1]);
        f.store.fail_next(2);

        assert!(f.sync.check("node", "1.0.0").await.unwrap());
        assert_eq!(f.store.calls(StoreCall::Exists), 3);
    }

    #[tokio::test]
    async fn undeclared_store_makes_no_calls() {
        let f = fixture(&[("node", "20.0.0")]);
        let install = f.temp.path().join("src");
        write_tree(&install, "x");

        assert_eq!(
            f.sync.store("node", "19.0.0", &install).await.unwrap(),
            StoreOutcome::Skipped(SkipReason::NotDeclared)
        );
        assert_eq!(f.store.total_calls(), 0);

        let forced = StoreOptions {
            ignore_scope: true,
            overwrite: false,
        };
        assert!(matches!(
            f.sync.store_with("node", "19.0.0", &install, forced).await.unwrap(),
            StoreOutcome::Stored { .. }
        ));
    }

    #[tokio::test]
    async fn second_store_is_skipped_unless_overwriting() {
        let f = fixture(&[("bun", "1.0.0")]);
        let install = f.temp.path().join("src");
        write_tree(&install, "x");

        assert!(matches!(
            f.sync.store("bun", "1.0.0", &install).await.unwrap(),
            StoreOutcome::Stored { .. }
        ));
        assert_eq!(
            f.sync.store("bun", "1.0.0", &install).await.unwrap(),
            StoreOutcome::Skipped(SkipReason::AlreadyCached)
        );
        let puts = f.store.calls(StoreCall::Put);

        let overwrite = StoreOptions {
            ignore_scope: false,
            overwrite: true,
        };
        assert!(matches!(
            f.sync.store_with("bun", "1.0.0", &install, overwrite).await.unwrap(),
            StoreOutcome::Stored { .. }
        ));
        assert_eq!(f.store.calls(StoreCall::Put), puts + 3);
    }

    #[tokio::test]
    async fn missing_source_is_reported() {
        let f = fixture(&[("node", "20.0.0")]);
        assert_eq!(
            f.sync
                .store("node", "20.0.0", &f.temp.path().join("absent"))
                .await
                .unwrap(),
            StoreOutcome::SourceMissing
        );
    }

    #[tokio::test]
    async fn rejected_upload_is_recorded() {
        let f = fixture(&[("node", "20.0.0")]);
        let install = f.temp.path().join("src");
        write_tree(&install, "x");
        f.store.set_failure(FailureMode::RejectPuts);

        assert!(matches!(
            f.sync.store("node", "20.0.0", &install).await.unwrap(),
            StoreOutcome::UploadFailure(_)
        ));
        // Permanent errors are not retried
        assert_eq!(f.store.calls(StoreCall::Put), 1);
        assert!(f.store.keys().is_empty());
        assert_eq!(f.sync.stats().await.unwrap().upload_failures, 1);
    }

    #[tokio::test]
    async fn concurrent_stores_serialize() {
        let f = fixture(&[("node", "20.0.0")]);
        let install = f.temp.path().join("src");
        write_tree(&install, "x");
        f.store.set_put_latency(Duration::from_millis(100));

        let sync = Arc::new(f.sync);
        let a = {
            let (sync, install) = (sync.clone(), install.clone());
            tokio::spawn(async move { sync.store("node", "20.0.0", &install).await })
        };
        let b = {
            let (sync, install) = (sync.clone(), install.clone());
            tokio::spawn(async move { sync.store("node", "20.0.0", &install).await })
        };
        let mut outcomes = vec![a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        outcomes.sort_by_key(|o| matches!(o, StoreOutcome::Skipped(_)));

        assert!(matches!(outcomes[0], StoreOutcome::Stored { .. }));
        assert_eq!(outcomes[1], StoreOutcome::Skipped(SkipReason::AlreadyCached));
        assert_eq!(f.store.calls(StoreCall::Put), 3);
        assert_eq!(f.store.max_puts_in_flight(), 1);
    }

    #[tokio::test]
    async fn dead_writer_lock_is_reclaimed() {
        let f = fixture(&[("node", "20.0.0")]);
        let install = f.temp.path().join("src");
        write_tree(&install, "x");

        let key = f.sync.key_for("node", "20.0.0").unwrap();
        let lock_path = f.sync.locks().lock_path(&key.as_path());
        std::fs::create_dir_all(lock_path.parent().unwrap()).unwrap();
        std::fs::write(&lock_path, format!("{}\n", dead_pid())).unwrap();

        let started = Instant::now();
        assert!(matches!(
            f.sync.store("node", "20.0.0", &install).await.unwrap(),
            StoreOutcome::Stored { .. }
        ));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!lock_path.exists());
    }

    #[tokio::test]
    async fn live_writer_causes_lock_timeout() {
        let f = fixture_with(&[("node", "20.0.0")], |c| c.lock_timeout_secs = 0);
        let install = f.temp.path().join("src");
        write_tree(&install, "x");

        let key = f.sync.key_for("node", "20.0.0").unwrap();
        let _held = f
            .sync
            .locks()
            .acquire(&key.as_path(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(
            f.sync.store("node", "20.0.0", &install).await.unwrap(),
            StoreOutcome::LockTimeout
        );
        assert_eq!(f.store.calls(StoreCall::Put), 0);
    }

    #[tokio::test]
    async fn unavailable_synchronizer_is_inert() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            cache_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let mise = Arc::new(FakeMise {
            root: temp.path().join("installs"),
            installs: AtomicUsize::new(0),
        });
        let sync = CacheSynchronizer::connect(config, Declared::of(&[("node", "1.0")]), mise).await;

        assert!(!sync.is_available());
        assert!(sync.unavailable_reason().unwrap().contains("bucket"));
        assert!(!sync.check("node", "1.0").await.unwrap());
        assert_eq!(
            sync.restore("node", "1.0", &temp.path().join("d")).await.unwrap(),
            RestoreOutcome::Unavailable
        );
        assert_eq!(
            sync.store("node", "1.0", temp.path()).await.unwrap(),
            StoreOutcome::Skipped(SkipReason::Unavailable)
        );
        assert!(matches!(sync.cleanup(7).await, Err(CacheError::Unavailable(_))));
    }

    #[tokio::test]
    async fn cleanup_counts_objects_and_entries() {
        let f = fixture(&[]);
        let old = Utc::now() - chrono::Duration::days(30);
        for tool in ["a", "b"] {
            let key = f.sync.key_for(tool, "1.0").unwrap();
            for object in [key.archive_object(), key.checksum_object(), key.metadata_object()] {
                f.store.insert_with_mtime(&object, vec![0], old);
            }
        }
        let fresh = f.sync.key_for("c", "1.0").unwrap();
        f.store.overwrite(&fresh.archive_object(), vec![0]);

        let report = f.sync.cleanup(7).await.unwrap();
        assert_eq!(
            report,
            CleanupReport {
                objects_removed: 6,
                entries_removed: 2
            }
        );
        assert_eq!(f.store.keys(), vec![fresh.archive_object()]);

        let usage = f.sync.usage().await.unwrap();
        assert_eq!(usage.entries, 1);
        assert_eq!(usage.objects, 1);
    }

    #[tokio::test]
    async fn cleanup_local_removes_stale_locks() {
        let f = fixture(&[]);
        let lock_path = f.sync.locks().lock_path("stale");
        std::fs::create_dir_all(lock_path.parent().unwrap()).unwrap();
        std::fs::write(&lock_path, format!("{}\n", dead_pid())).unwrap();

        let report = f.sync.cleanup_local().await.unwrap();
        assert_eq!(report.locks_removed, 1);
        assert!(!lock_path.exists());
    }

    #[tokio::test]
    async fn warm_fills_every_gap() {
        let f = fixture(&[("installed", "1.0"), ("cached", "2.0"), ("neither", "3.0")]);

        write_tree(&f.temp.path().join("installs/installed/1.0"), "i");

        let elsewhere = f.temp.path().join("elsewhere");
        write_tree(&elsewhere, "c");
        let opts = StoreOptions {
            ignore_scope: true,
            overwrite: false,
        };
        f.sync.store_with("cached", "2.0", &elsewhere, opts).await.unwrap();

        let report = f.sync.warm(2).await.unwrap();
        let action = |name: &str| {
            report
                .results
                .iter()
                .find(|(t, _)| t.tool() == name)
                .map(|(_, a)| a.clone())
                .unwrap()
        };
        assert_eq!(action("installed"), WarmAction::Stored);
        assert_eq!(action("cached"), WarmAction::Restored);
        assert_eq!(action("neither"), WarmAction::InstalledAndStored);
        assert_eq!(report.failures().count(), 0);
        assert_eq!(f.mise.installs.load(Ordering::SeqCst), 1);

        assert!(f.temp.path().join("installs/cached/2.0/bin/tool").exists());
        for tool in [("installed", "1.0"), ("neither", "3.0")] {
            assert!(f.sync.check(tool.0, tool.1).await.unwrap());
        }

        let analysis = f.sync.analyze().await.unwrap();
        assert_eq!(analysis.len(), 3);
        assert!(analysis.iter().all(|s| s.cached && s.installed));
    }

    #[test]
    fn checksum_parsing() {
        let digest = "AB".repeat(32);
        let line = format!("{digest}  node-20.0.0.tar.gz\n");
        assert_eq!(parse_checksum(line.as_bytes()), Some("ab".repeat(32)));
        assert_eq!(parse_checksum(format!("  {digest}").as_bytes()), Some("ab".repeat(32)));

        assert_eq!(parse_checksum(b""), None);
        assert_eq!(parse_checksum(b" \n\t"), None);
        assert_eq!(parse_checksum(b"abc123  node.tar.gz\n"), None);
        assert_eq!(parse_checksum("zz".repeat(32).as_bytes()), None);
        assert_eq!(parse_checksum("a".repeat(65).as_bytes()), None);
    }
}
