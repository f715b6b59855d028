//! Directory-backed object store
//!
//! Treats a directory as a bucket: the object key is the relative path.
//! Useful for shared network mounts and for exercising the CLI without S3.

use super::{ObjectInfo, ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a key to a path below the root, refusing keys that escape it
    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(StorageError::Rejected(format!("invalid object key: {key}")));
        }
        Ok(self.root.join(relative))
    }
}

fn not_found_or(key: &str, context: String, e: std::io::Error) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::io(context, e)
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.object_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(format!("checking {}", path.display()), e)),
        }
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.object_path(key)?;
        fs::read(&path)
            .await
            .map_err(|e| not_found_or(key, format!("reading {}", path.display()), e))
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        let path = self.object_path(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::Rejected(format!("invalid object key: {key}")))?;
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(format!("creating {}", parent.display()), e))?;

        // Readers must never observe a partially written object
        let tmp = parent.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        fs::write(&tmp, &body)
            .await
            .map_err(|e| StorageError::io(format!("writing {}", tmp.display()), e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::io(format!("renaming to {}", path.display()), e));
        }

        debug!("Wrote {} ({} bytes)", path.display(), body.len());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(format!("listing {}", dir.display()), e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io(format!("listing {}", dir.display()), e))?
            {
                let path = entry.path();
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| StorageError::io(format!("stat {}", path.display()), e))?;

                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                if entry.file_name().to_string_lossy().starts_with(".tmp-") {
                    continue;
                }

                let Some(key) = relative_key(&self.root, &path) else {
                    continue;
                };
                if !key.starts_with(prefix) {
                    continue;
                }

                let last_modified = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                objects.push(ObjectInfo {
                    key,
                    size: meta.len(),
                    last_modified,
                });
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(format!("removing {}", path.display()), e)),
        }
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_then_get() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());

        store
            .put_object("p/tools/node/1/linux-x86_64/metadata.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();

        assert!(store.exists("p/tools/node/1/linux-x86_64/metadata.json").await.unwrap());
        assert_eq!(
            store.get_object("p/tools/node/1/linux-x86_64/metadata.json").await.unwrap(),
            b"{}"
        );
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        assert!(!store.exists("nope").await.unwrap());
        assert!(store.get_object("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        for key in ["../outside", "/abs", "a/../../b", ""] {
            assert!(store.put_object(key, vec![], "x").await.is_err(), "{key:?}");
        }
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        store.put_object("p/tools/a/x", vec![1, 2], "x").await.unwrap();
        store.put_object("p/tools/b/y", vec![3], "x").await.unwrap();
        store.put_object("q/other", vec![4], "x").await.unwrap();

        let listed = store.list("p/tools/").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["p/tools/a/x", "p/tools/b/y"]);
        assert_eq!(listed[0].size, 2);
    }

    #[tokio::test]
    async fn list_of_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path().join("absent"));
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        store.put_object("k", vec![1], "x").await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(!store.exists("k").await.unwrap());
    }
}
