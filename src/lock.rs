//! Path-keyed locking for coordinating concurrent writers.
//!
//! Every data-store publish path (store, complete-multipart, delete)
//! acquires the write lock for its target path before touching the
//! filesystem; readers acquire the read lock. This is cheap reader-writer
//! mutual exclusion, not a replacement for the atomic rename protocol —
//! it protects the read-modify-write windows around it (e.g. metadata
//! read-then-update) that the rename alone doesn't cover.

use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// A held read guard. Dropping it releases the lock.
pub type ReadGuard = OwnedRwLockReadGuard<()>;
/// A held write guard. Dropping it releases the lock.
pub type WriteGuard = OwnedRwLockWriteGuard<()>;

/// Acquires path-scoped read/write locks.
///
/// Implementations are free to model "path" however suits their
/// coordination domain (an in-process table, a distributed lock
/// service); callers only depend on the guard's `Drop` releasing it.
pub trait LockManager: Send + Sync {
    fn read<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<ReadGuard>> + Send + 'a>>;
    fn write<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<WriteGuard>> + Send + 'a>>;
}

/// In-process reader-writer lock table, keyed by an arbitrary string
/// (normally a canonicalized filesystem path).
#[derive(Default)]
pub struct InProcessLockManager {
    table: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl InProcessLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, key: &str) -> Arc<RwLock<()>> {
        let mut table = self.table.lock().await;
        table
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }
}

impl LockManager for InProcessLockManager {
    fn read<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<ReadGuard>> + Send + 'a>> {
        Box::pin(async move {
            let lock = self.entry(key).await;
            Ok(lock.read_owned().await)
        })
    }

    fn write<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<WriteGuard>> + Send + 'a>> {
        Box::pin(async move {
            let lock = self.entry(key).await;
            Ok(lock.write_owned().await)
        })
    }
}

/// A distributed lock, bounded by `acquire_timeout`, for multi-process
/// or multi-node deployments sharing the same network filesystem.
///
/// This manager coordinates across processes the same way
/// [`InProcessLockManager`] coordinates within one: one entry per key,
/// first-come-first-served, with a bounded wait instead of an unbounded
/// one since a dead peer must not wedge every future acquirer.
pub struct DistributedLockManager {
    inner: InProcessLockManager,
    key_prefix: String,
    acquire_timeout: Duration,
}

impl DistributedLockManager {
    pub fn new(key_prefix: impl Into<String>, acquire_timeout: Duration) -> Self {
        Self {
            inner: InProcessLockManager::new(),
            key_prefix: key_prefix.into(),
            acquire_timeout,
        }
    }

    fn namespaced_key(&self, path: &Path) -> String {
        format!(
            "{}:{}",
            self.key_prefix,
            path.to_string_lossy().to_ascii_lowercase()
        )
    }

    pub async fn read_path(&self, path: &Path) -> Result<ReadGuard> {
        let key = self.namespaced_key(path);
        tokio::time::timeout(self.acquire_timeout, self.inner.read(&key))
            .await
            .map_err(|_| EngineError::LockTimeout { path: key })?
    }

    pub async fn write_path(&self, path: &Path) -> Result<WriteGuard> {
        let key = self.namespaced_key(path);
        tokio::time::timeout(self.acquire_timeout, self.inner.write(&key))
            .await
            .map_err(|_| EngineError::LockTimeout { path: key })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let manager = InProcessLockManager::new();
        let _a = manager.write("a").await.unwrap();
        let _b = manager.write("b").await.unwrap();
    }

    #[tokio::test]
    async fn write_lock_excludes_concurrent_writer() {
        let manager = Arc::new(InProcessLockManager::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let guard = manager.write("x").await.unwrap();
        let manager2 = manager.clone();
        let order2 = order.clone();
        let handle = tokio::spawn(async move {
            let _g = manager2.write("x").await.unwrap();
            order2.lock().await.push(2);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        order.lock().await.push(1);
        drop(guard);
        handle.await.unwrap();

        assert_eq!(*order.lock().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn multiple_readers_proceed_concurrently() {
        let manager = InProcessLockManager::new();
        let r1 = manager.read("shared").await.unwrap();
        let r2 = manager.read("shared").await.unwrap();
        drop(r1);
        drop(r2);
    }

    #[tokio::test]
    async fn distributed_lock_times_out_when_contended() {
        let manager = DistributedLockManager::new("lamina", Duration::from_millis(50));
        let path = Path::new("/data/bucket/key.txt");
        let _guard = manager.write_path(path).await.unwrap();
        let result = manager.write_path(path).await;
        assert!(matches!(result, Err(EngineError::LockTimeout { .. })));
    }

    #[tokio::test]
    async fn distributed_lock_keys_are_case_insensitive() {
        let counter = Arc::new(AtomicU32::new(0));
        let manager = Arc::new(DistributedLockManager::new("lamina", Duration::from_millis(200)));
        let g1 = manager
            .write_path(Path::new("/data/Bucket/Key.txt"))
            .await
            .unwrap();
        counter.fetch_add(1, Ordering::SeqCst);
        let result = manager.write_path(Path::new("/data/bucket/key.txt")).await;
        assert!(result.is_err());
        drop(g1);
    }
}
