//! Tool installation cache
//!
//! Entries live in object storage under deterministic keys derived from
//! tool, version, platform and architecture. Each entry is three objects:
//!
//! | Object | Content |
//! |--------|---------|
//! | `<tool>-<version>.tar.gz` | gzip tar of the install tree |
//! | `<tool>-<version>.tar.gz.sha256` | hex SHA-256 of the archive |
//! | `metadata.json` | tool, platform, size, checksum, creation time |
//!
//! Restores verify the checksum before touching the destination, and stores
//! are serialized per key by lock files.

pub mod archive;
pub mod key;
pub mod lock;
pub mod stats;
pub mod sync;

pub use archive::{pack, sha256_hex, unpack, ArchiveError, PackedArchive};
pub use key::{CacheKey, HostPlatform, ToolVersionRef};
pub use lock::{LockGuard, LockManager};
pub use stats::{StatsLedger, StatsRecord, ToolVersionStats};
pub use sync::{
    is_installed, CacheSynchronizer, CleanupReport, EntryMetadata, LocalCleanupReport,
    RemoteUsage, RestoreOutcome, SkipReason, StoreOptions, StoreOutcome, ToolStatus, WarmAction,
    WarmReport,
};
