//! In-memory object store
//!
//! Backs the synchronizer tests. Supports failure injection, per-call
//! counters, artificial put latency and tracking of concurrent puts.

use super::{ObjectInfo, ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Injected failure behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Behave normally
    #[default]
    None,
    /// Every call fails with a transport error
    Unreachable,
    /// Every call stalls long enough to trip any sane timeout
    Hang,
    /// Reads work; writes are rejected
    RejectPuts,
}

/// Kinds of gateway call, for counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCall {
    Exists,
    Get,
    Put,
    List,
    Delete,
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Object store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failure: Mutex<FailureMode>,
    transient_failures: AtomicUsize,
    calls: Mutex<HashMap<StoreCall, usize>>,
    put_latency: Mutex<Option<Duration>>,
    puts_in_flight: AtomicUsize,
    max_puts_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failure(&self, mode: FailureMode) {
        *lock(&self.failure) = mode;
    }

    /// Fail the next `n` calls with a transport error, then recover
    pub fn fail_next(&self, n: usize) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Delay every put by `latency`
    pub fn set_put_latency(&self, latency: Duration) {
        *lock(&self.put_latency) = Some(latency);
    }

    /// Seed an object with an explicit modification time
    pub fn insert_with_mtime(&self, key: &str, body: Vec<u8>, last_modified: DateTime<Utc>) {
        lock(&self.objects).insert(
            key.to_string(),
            StoredObject {
                body,
                last_modified,
            },
        );
    }

    /// Replace an object's body without counting a call
    pub fn overwrite(&self, key: &str, body: Vec<u8>) {
        self.insert_with_mtime(key, body, Utc::now());
    }

    /// Remove an object without counting a call
    pub fn remove(&self, key: &str) {
        lock(&self.objects).remove(key);
    }

    /// Read an object without counting a call
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).map(|o| o.body.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn calls(&self, call: StoreCall) -> usize {
        lock(&self.calls).get(&call).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    /// Highest number of puts observed running at once
    pub fn max_puts_in_flight(&self) -> usize {
        self.max_puts_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: StoreCall) -> StorageResult<()> {
        *lock(&self.calls).entry(call).or_insert(0) += 1;
        let pending = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(StorageError::Transport("flaky connection (injected)".to_string()));
        }

        let mode = *lock(&self.failure);
        match mode {
            FailureMode::None => Ok(()),
            FailureMode::Unreachable => Err(StorageError::Transport(
                "connection refused (injected)".to_string(),
            )),
            FailureMode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(StorageError::Transport("hung call (injected)".to_string()))
            }
            FailureMode::RejectPuts if call == StoreCall::Put => Err(StorageError::Rejected(
                "AccessDenied (injected)".to_string(),
            )),
            FailureMode::RejectPuts => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.enter(StoreCall::Exists).await?;
        Ok(lock(&self.objects).contains_key(key))
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.enter(StoreCall::Get).await?;
        lock(&self.objects)
            .get(key)
            .map(|o| o.body.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        self.enter(StoreCall::Put).await?;

        let now = self.puts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_puts_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *lock(&self.put_latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.insert_with_mtime(key, body, Utc::now());
        self.puts_in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        self.enter(StoreCall::List).await?;
        Ok(lock(&self.objects)
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, o)| ObjectInfo {
                key: key.clone(),
                size: o.body.len() as u64,
                last_modified: o.last_modified,
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.enter(StoreCall::Delete).await?;
        lock(&self.objects).remove(key);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_and_counters() {
        let store = MemoryStore::new();
        store.put_object("a/b", b"hello".to_vec(), "text/plain").await.unwrap();
        assert_eq!(store.get_object("a/b").await.unwrap(), b"hello");
        assert!(store.get_object("a/c").await.unwrap_err().is_not_found());
        assert_eq!(store.calls(StoreCall::Put), 1);
        assert_eq!(store.calls(StoreCall::Get), 2);
        assert_eq!(store.total_calls(), 3);
    }

    #[tokio::test]
    async fn reject_puts_keeps_reads() {
        let store = MemoryStore::new();
        store.overwrite("k", b"v".to_vec());
        store.set_failure(FailureMode::RejectPuts);
        assert!(store.exists("k").await.unwrap());
        assert!(matches!(
            store.put_object("k2", vec![], "x").await,
            Err(StorageError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn transient_failures_recover() {
        let store = MemoryStore::new();
        store.fail_next(2);
        assert!(store.exists("k").await.unwrap_err().is_transient());
        assert!(store.exists("k").await.is_err());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn tracks_concurrent_puts() {
        let store = std::sync::Arc::new(MemoryStore::new());
        store.set_put_latency(Duration::from_millis(50));

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.put_object("a", vec![1], "x").await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.put_object("b", vec![2], "x").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(store.max_puts_in_flight(), 2);
    }
}
