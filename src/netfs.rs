//! Network-filesystem retry pipeline and atomic publish helpers.
//!
//! CIFS and NFS mounts surface transient failures (stale handles, share
//! violations, silly-rename races) that a local filesystem never does.
//! When [`NetworkMode`] is not `None`, every publish operation routes
//! through [`retry`], which classifies the `io::Error` and backs off
//! before trying again.

use crate::config::NetworkMode;
use crate::error::{EngineError, Result};
use rand::Rng;
use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Retry policy derived from [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub network_mode: NetworkMode,
    pub retry_count: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(network_mode: NetworkMode, retry_count: u32, base_delay_ms: u64) -> Self {
        Self {
            network_mode,
            retry_count,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }
}

/// Run `op`, retrying on transient network-filesystem errors per
/// `policy`. `op` is called at most `retry_count + 1` times.
///
/// Retrying is a no-op when `network_mode` is `None`: the first error is
/// returned immediately.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if policy.network_mode == NetworkMode::None
                    || attempt >= policy.retry_count
                    || !is_transient(policy.network_mode, &err)
                {
                    return Err(EngineError::Io(err));
                }
                let delay = backoff_delay(policy.base_delay, attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying network filesystem operation"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Exponential backoff (factor 2) from a base delay, with ±25% jitter.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.as_millis().saturating_mul(1u128 << attempt.min(16));
    let jitter_frac = rand::thread_rng().gen_range(-0.25..=0.25);
    let jittered = (exp as f64) * (1.0 + jitter_frac);
    Duration::from_millis(jittered.max(0.0) as u64)
}

/// Classify an I/O error as a transient, retryable network-filesystem
/// failure for the given mode.
///
/// Rust's `io::ErrorKind` doesn't distinguish CIFS share violations or
/// NFS stale-handle errors, so classification falls back to matching on
/// `raw_os_error` / message text the way the underlying syscalls surface
/// them, mirroring the exception-class filtering network clients build
/// on top of POSIX errno.
fn is_transient(mode: NetworkMode, err: &io::Error) -> bool {
    use io::ErrorKind::*;
    if matches!(err.kind(), WouldBlock | TimedOut | Interrupted) {
        return true;
    }
    match mode {
        NetworkMode::Cifs => is_transient_cifs(err),
        NetworkMode::Nfs => is_transient_nfs(err),
        NetworkMode::None => false,
    }
}

const CIFS_NEEDLES: &[&str] = &[
    "being used by another process",
    "network path was not found",
    "access is denied",
    "the process cannot access",
    "sharing violation",
    "specified network name is no longer available",
    "directory not empty",
    "the directory is not empty",
];

const NFS_NEEDLES: &[&str] = &[
    "stale file handle",
    "stale nfs file handle",
    "input/output error",
    "no such file or directory",
];

fn is_transient_cifs(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    message_contains_any(err, CIFS_NEEDLES)
}

fn is_transient_nfs(err: &io::Error) -> bool {
    if err.raw_os_error() == Some(116) {
        return true;
    }
    message_contains_any(err, NFS_NEEDLES)
}

fn message_contains_any(err: &io::Error, needles: &[&str]) -> bool {
    let message = err.to_string().to_ascii_lowercase();
    needles.iter().any(|n| message.contains(n))
}

/// Atomically publish `temp_path` as `final_path`.
///
/// On CIFS, a direct rename-over-existing-file can surface a share
/// violation while a reader still holds the destination open, so the
/// destination is first renamed aside, the new file renamed into place,
/// then the aside file removed. NFS and local filesystems use a single
/// `rename`, which POSIX already guarantees is atomic.
pub async fn atomic_move(mode: NetworkMode, temp_path: &Path, final_path: &Path) -> Result<()> {
    match mode {
        NetworkMode::Cifs => atomic_move_cifs(temp_path, final_path).await,
        NetworkMode::Nfs | NetworkMode::None => {
            tokio::fs::rename(temp_path, final_path)
                .await
                .map_err(EngineError::Io)
        }
    }
}

async fn atomic_move_cifs(temp_path: &Path, final_path: &Path) -> Result<()> {
    if !tokio::fs::try_exists(final_path)
        .await
        .map_err(EngineError::Io)?
    {
        return tokio::fs::rename(temp_path, final_path)
            .await
            .map_err(EngineError::Io);
    }

    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("object");
    let aside = final_path.with_file_name(format!("{file_name}.backup_{}", uuid::Uuid::new_v4()));

    tokio::fs::rename(final_path, &aside)
        .await
        .map_err(EngineError::Io)?;

    match tokio::fs::rename(temp_path, final_path).await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&aside).await;
            Ok(())
        }
        Err(e) => {
            // Best-effort restore so the publish failure doesn't also
            // delete the previously-published object.
            let _ = tokio::fs::rename(&aside, final_path).await;
            Err(EngineError::Io(e))
        }
    }
}

/// Create `dir` and any missing ancestors, tolerating a concurrent
/// creator (idempotent against `AlreadyExists`).
///
/// `AlreadyExists` only means the path really is a directory once
/// confirmed with a stat: a stray regular file sitting at `dir` also
/// surfaces as `AlreadyExists` from `create_dir_all`, and silently
/// treating that as success would mean every later publish into `dir`
/// attempts to rename into a path that isn't a directory at all.
pub async fn ensure_directory_exists(dir: &Path) -> Result<()> {
    match tokio::fs::create_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let metadata = tokio::fs::metadata(dir).await.map_err(EngineError::Io)?;
            if metadata.is_dir() {
                Ok(())
            } else {
                Err(EngineError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!(
                        "a file is blocking the directory path {}",
                        dir.display()
                    ),
                )))
            }
        }
        Err(e) => Err(EngineError::Io(e)),
    }
}

/// Delete `dir` if it's empty, then walk upward deleting empty parent
/// directories, stopping at `stop_at` (exclusive) or the first
/// non-empty directory.
pub async fn delete_directory_if_empty(dir: &Path, stop_at: &Path) -> Result<()> {
    let mut current = dir.to_path_buf();
    loop {
        if current == stop_at || !current.starts_with(stop_at) {
            return Ok(());
        }
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(EngineError::Io(e)),
        };
        if entries.next_entry().await.map_err(EngineError::Io)?.is_some() {
            return Ok(());
        }
        match tokio::fs::remove_dir(&current).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(EngineError::Io(e)),
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_is_noop_when_mode_is_none() {
        let policy = RetryPolicy::new(NetworkMode::None, 5, 1);
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(io::Error::new(io::ErrorKind::WouldBlock, "busy")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(NetworkMode::Nfs, 5, 1);
        let calls = AtomicU32::new(0);
        let result = retry(policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(io::Error::from_raw_os_error(116)) // ESTALE
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_retry_non_transient_errors() {
        let policy = RetryPolicy::new(NetworkMode::Nfs, 5, 1);
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn atomic_move_publishes_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join(".lamina-tmp-x");
        let dest = dir.path().join("final.txt");
        tokio::fs::write(&temp, b"hello").await.unwrap();
        atomic_move(NetworkMode::None, &temp, &dest).await.unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello");
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn atomic_move_cifs_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join(".lamina-tmp-x");
        let dest = dir.path().join("final.txt");
        tokio::fs::write(&dest, b"old").await.unwrap();
        tokio::fs::write(&temp, b"new").await.unwrap();
        atomic_move(NetworkMode::Cifs, &temp, &dest).await.unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"new");
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn ensure_directory_exists_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_directory_exists(&nested).await.unwrap();
        ensure_directory_exists(&nested).await.unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn ensure_directory_exists_fails_on_blocking_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("a/b");
        tokio::fs::create_dir(dir.path().join("a")).await.unwrap();
        tokio::fs::write(&blocked, b"not a directory").await.unwrap();

        let err = ensure_directory_exists(&blocked).await.unwrap_err();
        assert!(matches!(err, EngineError::Io(e) if e.kind() == io::ErrorKind::AlreadyExists));
        assert!(blocked.is_file());
    }

    #[tokio::test]
    async fn delete_directory_if_empty_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_directory_exists(&nested).await.unwrap();
        delete_directory_if_empty(&nested, dir.path()).await.unwrap();
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn delete_directory_if_empty_stops_at_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_directory_exists(&nested).await.unwrap();
        tokio::fs::write(dir.path().join("a/keep.txt"), b"x")
            .await
            .unwrap();
        delete_directory_if_empty(&nested, dir.path()).await.unwrap();
        assert!(dir.path().join("a").exists());
        assert!(!dir.path().join("a/b").exists());
    }
}
