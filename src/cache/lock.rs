//! Cross-process lock files
//!
//! A lock is a file created with `create_new` that holds the owner's PID.
//! Contenders poll until the file disappears or its owner is found dead, in
//! which case the lock is reclaimed at once. Locks held by a live process in
//! this same process (another task) are waited on like any other.
//!
//! Reclaiming takes an advisory `flock` on `<dir>/.reclaim` and checks the
//! owner again before removing the file. Only reclaimers delete a lock they
//! do not own, so under that lock an abandoned file cannot be swapped for a
//! live one.

use crate::error::{CacheError, CacheResult};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const LOCK_EXT: &str = "lock";
const RECLAIM_FILE: &str = ".reclaim";

/// What a lock file on disk says about its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState {
    Gone,
    Held,
    Abandoned(Option<u32>),
}

/// Hands out named locks stored in one directory
#[derive(Debug, Clone)]
pub struct LockManager {
    dir: PathBuf,
    poll_interval: Duration,
    stale_grace: Duration,
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            poll_interval: Duration::from_secs(1),
            stale_grace: Duration::from_secs(30),
        }
    }

    /// Override the wait between acquisition attempts
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Age after which an unreadable lock file counts as abandoned
    pub fn with_stale_grace(mut self, grace: Duration) -> Self {
        self.stale_grace = grace;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the lock file for `name`
    ///
    /// Names are cache keys containing `/`; the file name keeps a readable
    /// slug plus a hash so distinct names never collide.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        let slug: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .take(64)
            .collect();
        let digest = hex::encode(Sha256::digest(name.as_bytes()));
        self.dir
            .join(format!("{}-{}.{}", slug, &digest[..16], LOCK_EXT))
    }

    /// Acquire the lock `name`, waiting up to `timeout`
    pub async fn acquire(&self, name: &str, timeout: Duration) -> CacheResult<LockGuard> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::io(format!("creating {}", self.dir.display()), e))?;

        let path = self.lock_path(name);
        let started = Instant::now();

        loop {
            match try_create(&path).await {
                Ok(()) => {
                    debug!(lock = name, "Acquired lock");
                    return Ok(LockGuard {
                        name: name.to_string(),
                        path: Some(path),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(CacheError::io(format!("creating {}", path.display()), e));
                }
            }

            if self.reclaim_if_stale(&path).await {
                continue;
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(CacheError::LockTimeout {
                    name: name.to_string(),
                    waited_secs: waited.as_secs(),
                });
            }

            debug!(lock = name, "Lock held by another process, waiting");
            tokio::time::sleep(self.poll_interval.min(timeout - waited)).await;
        }
    }

    /// Remove the lock file at `path` if its owner is gone
    ///
    /// Returns true when the caller should retry immediately.
    async fn reclaim_if_stale(&self, path: &Path) -> bool {
        match self.inspect(path).await {
            LockState::Gone => return true,
            LockState::Held => return false,
            LockState::Abandoned(_) => {}
        }

        let _reclaim = match ReclaimLock::try_acquire(&self.dir).await {
            Ok(Some(lock)) => lock,
            // Another contender is reclaiming; poll again later
            Ok(None) => return false,
            Err(e) => {
                warn!("Failed to lock {} for reclaim: {}", self.dir.display(), e);
                return false;
            }
        };

        match self.inspect(path).await {
            LockState::Gone => return true,
            LockState::Held => return false,
            LockState::Abandoned(Some(pid)) => {
                info!(pid, lock = %path.display(), "Reclaiming lock from dead process")
            }
            LockState::Abandoned(None) => {
                warn!(lock = %path.display(), "Reclaiming unreadable lock file")
            }
        }

        match fs::remove_file(path).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!("Failed to reclaim {}: {}", path.display(), e);
                false
            }
        }
    }

    async fn inspect(&self, path: &Path) -> LockState {
        let owner = match read_owner(path).await {
            Ok(owner) => owner,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return LockState::Gone,
            Err(_) => None,
        };

        match owner {
            Some(pid) if pid_alive(pid) => LockState::Held,
            Some(pid) => LockState::Abandoned(Some(pid)),
            None if older_than(path, self.stale_grace).await => LockState::Abandoned(None),
            None => LockState::Held,
        }
    }

    /// Reclaim every abandoned lock in the directory
    ///
    /// Returns the number of lock files removed.
    pub async fn cleanup_stale(&self) -> CacheResult<usize> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::io(format!("reading {}", self.dir.display()), e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(format!("reading {}", self.dir.display()), e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == LOCK_EXT)
                && self.reclaim_if_stale(&path).await
                && !path.exists()
            {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

async fn try_create(path: &Path) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    let written = match file
        .write_all(format!("{}\n", std::process::id()).as_bytes())
        .await
    {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    if written.is_err() {
        // An ownerless empty file would block everyone until the grace period
        let _ = fs::remove_file(path).await;
    }
    written
}

/// Advisory lock serializing reclaimers; released when dropped
#[derive(Debug)]
struct ReclaimLock {
    _file: std::fs::File,
}

impl ReclaimLock {
    /// `None` when another process or task holds it
    async fn try_acquire(dir: &Path) -> io::Result<Option<Self>> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(RECLAIM_FILE))
            .await?
            .into_std()
            .await;
        if try_lock_exclusive(&file)? {
            Ok(Some(Self { _file: file }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &std::fs::File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor belongs to `file`, which outlives the call
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &std::fs::File) -> io::Result<bool> {
    Ok(true)
}

async fn read_owner(path: &Path) -> io::Result<Option<u32>> {
    let content = fs::read_to_string(path).await?;
    Ok(content.trim().parse::<u32>().ok().filter(|pid| *pid > 0))
}

async fn older_than(path: &Path, age: Duration) -> bool {
    let Ok(meta) = fs::metadata(path).await else {
        return false;
    };
    meta.modified()
        .ok()
        .and_then(|m| SystemTime::now().duration_since(m).ok())
        .is_some_and(|elapsed| elapsed >= age)
}

/// Whether a process with this PID exists
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission check
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    true
}

/// Exclusive ownership of a named lock; released on drop
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    path: Option<PathBuf>,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the lock; later calls do nothing
    pub fn release(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(lock = %self.name, "Released lock"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove lock file {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
