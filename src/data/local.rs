//! Local filesystem implementation of [`ObjectDataStore`].

use super::{CopyOutcome, ObjectDataStore, ObjectInfo};
use crate::checksum::{self, StreamingChecksum};
use crate::chunked::{self, BoxedChunkValidator};
use crate::config::BucketType;
use crate::error::{EngineError, Result};
use crate::lock::LockManager;
use crate::model::{ByteRange, ChecksumRequest, Checksums, ListResult, StoreOutcome};
use crate::netfs::{self, RetryPolicy};
use crate::path;
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

const COPY_BUFFER_SIZE: usize = 8 * 1024;

/// Stores object bytes as flat files under `<data-root>/<bucket>/<key>`.
pub struct LocalObjectDataStore {
    root: PathBuf,
    temp_prefix: String,
    inline_metadata_dir_name: String,
    retry_policy: RetryPolicy,
    locks: Arc<dyn LockManager>,
}

impl LocalObjectDataStore {
    pub fn new(
        root: impl Into<PathBuf>,
        temp_prefix: impl Into<String>,
        inline_metadata_dir_name: impl Into<String>,
        retry_policy: RetryPolicy,
        locks: Arc<dyn LockManager>,
    ) -> Self {
        Self {
            root: root.into(),
            temp_prefix: temp_prefix.into(),
            inline_metadata_dir_name: inline_metadata_dir_name.into(),
            retry_policy,
            locks,
        }
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn temp_name(&self) -> String {
        format!("{}{}", self.temp_prefix, Uuid::new_v4().simple())
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            let policy = self.retry_policy;
            netfs::retry(policy, || netfs::ensure_directory_exists(parent)).await?;
        }
        Ok(())
    }

    /// Stream `source` into a fresh temp file beside `final_path`,
    /// accumulating `checksum_request`'s algorithm along the way.
    ///
    /// When `chunk_validator` is given, `source` is treated as an
    /// `aws-chunked`-encoded stream: it is run through
    /// [`chunked::decode_chunked`], which validates every chunk's
    /// signature before its payload is written, and a failing chunk
    /// aborts the write before the temp file is published. Returns the
    /// temp path and the object's size.
    async fn write_temp<'a>(
        &self,
        final_path: &Path,
        mut source: Pin<Box<dyn AsyncRead + Send + 'a>>,
        chunk_validator: Option<BoxedChunkValidator>,
        checksum_request: &Option<ChecksumRequest>,
    ) -> Result<(PathBuf, u64, Checksums)> {
        self.ensure_parent(final_path).await?;
        let parent = final_path.parent().unwrap_or(&self.root);
        let temp_path = parent.join(self.temp_name());

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .map_err(EngineError::Io)?;

        let mut accumulator = checksum_request
            .as_ref()
            .map(|r| StreamingChecksum::new(&[r.algorithm]));
        let mut size: u64 = 0;

        if let Some(validator) = chunk_validator {
            let accumulator = &mut accumulator;
            let size_ref = &mut size;
            let result = chunked::decode_chunked(&mut source, &mut file, validator, |payload| {
                *size_ref += payload.len() as u64;
                if let Some(acc) = accumulator.as_mut() {
                    acc.append(payload);
                }
            })
            .await;
            if let Err(e) = result {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e);
            }
        } else {
            let mut buf = [0u8; COPY_BUFFER_SIZE];
            loop {
                let n = match source.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        let _ = tokio::fs::remove_file(&temp_path).await;
                        return Err(EngineError::Io(e));
                    }
                };
                if let Err(e) = file.write_all(&buf[..n]).await {
                    let _ = tokio::fs::remove_file(&temp_path).await;
                    return Err(EngineError::Io(e));
                }
                if let Some(acc) = accumulator.as_mut() {
                    acc.append(&buf[..n]);
                }
                size += n as u64;
            }
        }

        if let Err(e) = file.sync_all().await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(EngineError::Io(e));
        }
        drop(file);

        let checksums = accumulator.map(StreamingChecksum::finish).unwrap_or_default();

        if let Some(request) = checksum_request {
            if !checksum::verify_checksum(&checksums, request.algorithm, &request.expected) {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(EngineError::InvalidChecksum);
            }
        }

        Ok((temp_path, size, checksums))
    }

    async fn publish(&self, temp_path: &Path, final_path: &Path) -> Result<()> {
        let policy = self.retry_policy;
        let result = netfs::atomic_move(policy.network_mode, temp_path, final_path).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(temp_path).await;
        }
        result
    }
}

impl ObjectDataStore for LocalObjectDataStore {
    fn store<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        source: Pin<Box<dyn AsyncRead + Send + 'a>>,
        chunk_validator: Option<BoxedChunkValidator>,
        checksum_request: Option<ChecksumRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<StoreOutcome>> + Send + 'a>> {
        Box::pin(async move {
            path::validate_key(key, &self.temp_prefix, &self.inline_metadata_dir_name)?;
            let final_path = path::resolve_under(&self.bucket_root(bucket), key)?;
            let _guard = self.locks.write(&final_path.to_string_lossy()).await?;

            let (temp_path, size, checksums) = self
                .write_temp(&final_path, source, chunk_validator, &checksum_request)
                .await?;
            let etag = checksum::md5_etag_of_file(&temp_path)
                .await
                .map_err(EngineError::Io)?;
            self.publish(&temp_path, &final_path).await?;

            Ok(StoreOutcome {
                size,
                etag,
                checksums,
            })
        })
    }

    fn store_from_parts<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        sources: Vec<Pin<Box<dyn AsyncRead + Send + 'a>>>,
    ) -> Pin<Box<dyn Future<Output = Result<StoreOutcome>> + Send + 'a>> {
        Box::pin(async move {
            path::validate_key(key, &self.temp_prefix, &self.inline_metadata_dir_name)?;
            let final_path = path::resolve_under(&self.bucket_root(bucket), key)?;
            let _guard = self.locks.write(&final_path.to_string_lossy()).await?;

            self.ensure_parent(&final_path).await?;
            let parent = final_path.parent().unwrap_or(&self.root);
            let temp_path = parent.join(self.temp_name());

            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)
                .await
                .map_err(EngineError::Io)?;

            let mut size: u64 = 0;
            for mut source in sources {
                let mut buf = [0u8; COPY_BUFFER_SIZE];
                loop {
                    let n = match source.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) => {
                            let _ = tokio::fs::remove_file(&temp_path).await;
                            return Err(EngineError::Io(e));
                        }
                    };
                    if let Err(e) = file.write_all(&buf[..n]).await {
                        let _ = tokio::fs::remove_file(&temp_path).await;
                        return Err(EngineError::Io(e));
                    }
                    size += n as u64;
                }
            }

            if let Err(e) = file.sync_all().await {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(EngineError::Io(e));
            }
            drop(file);

            let etag = checksum::md5_etag_of_file(&temp_path)
                .await
                .map_err(EngineError::Io)?;
            self.publish(&temp_path, &final_path).await?;

            Ok(StoreOutcome {
                size,
                etag,
                checksums: Checksums::default(),
            })
        })
    }

    fn read<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        mut dest: Pin<Box<dyn AsyncWrite + Send + 'a>>,
        range: Option<ByteRange>,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let final_path = path::resolve_under(&self.bucket_root(bucket), key)?;
            let _guard = self.locks.read(&final_path.to_string_lossy()).await?;

            let mut file = match tokio::fs::File::open(&final_path).await {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(EngineError::Io(e)),
            };
            let size = file.metadata().await.map_err(EngineError::Io)?.len();

            let to_copy = match range {
                None => size,
                Some(r) => {
                    if r.is_empty() || r.start >= size || r.end >= size {
                        return Ok(false);
                    }
                    file.seek(std::io::SeekFrom::Start(r.start))
                        .await
                        .map_err(EngineError::Io)?;
                    r.len()
                }
            };

            let mut remaining = to_copy;
            let mut buf = [0u8; COPY_BUFFER_SIZE];
            while remaining > 0 {
                let want = remaining.min(COPY_BUFFER_SIZE as u64) as usize;
                let n = file.read(&mut buf[..want]).await.map_err(EngineError::Io)?;
                if n == 0 {
                    break;
                }
                dest.write_all(&buf[..n]).await.map_err(EngineError::Io)?;
                remaining -= n as u64;
            }
            dest.flush().await.map_err(EngineError::Io)?;
            Ok(true)
        })
    }

    fn exists<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let final_path = path::resolve_under(&self.bucket_root(bucket), key)?;
            match tokio::fs::metadata(&final_path).await {
                Ok(meta) => Ok(meta.is_file()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(EngineError::Io(e)),
            }
        })
    }

    fn info<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ObjectInfo>>> + Send + 'a>> {
        Box::pin(async move {
            let final_path = path::resolve_under(&self.bucket_root(bucket), key)?;
            match tokio::fs::metadata(&final_path).await {
                Ok(meta) if meta.is_file() => Ok(Some(ObjectInfo {
                    size: meta.len(),
                    last_modified: meta.modified().map_err(EngineError::Io)?,
                })),
                Ok(_) => Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(EngineError::Io(e)),
            }
        })
    }

    fn delete<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let final_path = path::resolve_under(&self.bucket_root(bucket), key)?;
            let _guard = self.locks.write(&final_path.to_string_lossy()).await?;

            let existed = match tokio::fs::remove_file(&final_path).await {
                Ok(()) => true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => return Err(EngineError::Io(e)),
            };

            if let Some(parent) = final_path.parent() {
                netfs::delete_directory_if_empty(parent, &self.bucket_root(bucket)).await?;
            }
            Ok(existed)
        })
    }

    fn compute_etag<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>> {
        Box::pin(async move {
            let final_path = path::resolve_under(&self.bucket_root(bucket), key)?;
            if !final_path.is_file() {
                return Ok(None);
            }
            let etag = checksum::md5_etag_of_file(&final_path)
                .await
                .map_err(EngineError::Io)?;
            Ok(Some(etag))
        })
    }

    fn copy<'a>(
        &'a self,
        src_bucket: &'a str,
        src_key: &'a str,
        dst_bucket: &'a str,
        dst_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CopyOutcome>>> + Send + 'a>> {
        Box::pin(async move {
            path::validate_key(dst_key, &self.temp_prefix, &self.inline_metadata_dir_name)?;
            let src_path = path::resolve_under(&self.bucket_root(src_bucket), src_key)?;
            if !src_path.is_file() {
                return Ok(None);
            }
            let dst_path = path::resolve_under(&self.bucket_root(dst_bucket), dst_key)?;
            let _guard = self.locks.write(&dst_path.to_string_lossy()).await?;

            self.ensure_parent(&dst_path).await?;
            let parent = dst_path.parent().unwrap_or(&self.root);
            let temp_path = parent.join(self.temp_name());

            if let Err(e) = tokio::fs::copy(&src_path, &temp_path).await {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(EngineError::Io(e));
            }
            {
                let file = tokio::fs::File::open(&temp_path).await.map_err(EngineError::Io)?;
                file.sync_all().await.map_err(EngineError::Io)?;
            }

            self.publish(&temp_path, &dst_path).await?;

            let size = tokio::fs::metadata(&dst_path)
                .await
                .map_err(EngineError::Io)?
                .len();
            let etag = checksum::md5_etag_of_file(&dst_path)
                .await
                .map_err(EngineError::Io)?;

            Ok(Some(CopyOutcome { size, etag }))
        })
    }

    fn list<'a>(
        &'a self,
        bucket: &'a str,
        bucket_type: BucketType,
        prefix: &'a str,
        delimiter: Option<&'a str>,
        start_after: Option<&'a str>,
        max_keys: usize,
    ) -> Pin<Box<dyn Future<Output = Result<ListResult>> + Send + 'a>> {
        Box::pin(async move {
            let bucket_root = self.bucket_root(bucket);
            let dir_part = match prefix.rfind('/') {
                Some(idx) => &prefix[..idx],
                None => "",
            };
            let search_path = path::resolve_under(&bucket_root, dir_part)?;

            if !search_path.is_dir() {
                return Ok(ListResult::default());
            }

            let recursive = delimiter != Some("/");
            let ordered = bucket_type == BucketType::GeneralPurpose;

            let mut entries = Vec::new();
            collect_entries(
                &search_path,
                &bucket_root,
                recursive,
                &self.temp_prefix,
                &self.inline_metadata_dir_name,
                &mut entries,
            )
            .await?;

            entries.retain(|(key, _)| key.starts_with(prefix));

            if ordered {
                entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            }

            let mut keys = Vec::new();
            let mut common_prefixes = BTreeSet::new();
            let mut is_truncated = false;
            let mut last_emitted: Option<String> = None;

            let mut iter = entries.into_iter();
            if let Some(after) = start_after {
                iter = {
                    let remaining: Vec<_> =
                        iter.skip_while(|(key, _)| key.as_str() <= after).collect();
                    remaining.into_iter()
                };
            }

            for (key, is_dir) in iter {
                if keys.len() + common_prefixes.len() >= max_keys {
                    is_truncated = true;
                    break;
                }

                if is_dir && delimiter == Some("/") {
                    common_prefixes.insert(format!("{key}/"));
                    last_emitted = Some(key);
                } else if let Some(delim) = delimiter.filter(|d| *d != "/") {
                    let remainder = &key[prefix.len().min(key.len())..];
                    if let Some(idx) = remainder.find(delim) {
                        let common = format!("{prefix}{}", &remainder[..idx + delim.len()]);
                        common_prefixes.insert(common);
                        last_emitted = Some(key);
                    } else {
                        last_emitted = Some(key.clone());
                        keys.push(key);
                    }
                } else if !is_dir {
                    last_emitted = Some(key.clone());
                    keys.push(key);
                }
            }

            let mut common_prefixes: Vec<String> = common_prefixes.into_iter().collect();
            if ordered {
                common_prefixes.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
            }

            Ok(ListResult {
                keys,
                common_prefixes,
                is_truncated,
                next_start_after: if is_truncated { last_emitted } else { None },
            })
        })
    }
}

/// Walk `dir` (one level, or the full subtree when `recursive`),
/// producing `(bucket-relative key, is_dir)` pairs. Temp files and the
/// inline-metadata directory are excluded.
fn collect_entries<'a>(
    dir: &'a Path,
    bucket_root: &'a Path,
    recursive: bool,
    temp_prefix: &'a str,
    inline_metadata_dir_name: &'a str,
    out: &'a mut Vec<(String, bool)>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut read_dir = tokio::fs::read_dir(dir).await.map_err(EngineError::Io)?;
        while let Some(entry) = read_dir.next_entry().await.map_err(EngineError::Io)? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(temp_prefix) || name == inline_metadata_dir_name {
                continue;
            }
            let file_type = entry.file_type().await.map_err(EngineError::Io)?;
            let path = entry.path();
            let relative = path
                .strip_prefix(bucket_root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");

            if file_type.is_dir() {
                if recursive {
                    collect_entries(
                        &path,
                        bucket_root,
                        recursive,
                        temp_prefix,
                        inline_metadata_dir_name,
                        out,
                    )
                    .await?;
                } else {
                    out.push((relative, true));
                }
            } else {
                out.push((relative, false));
            }
        }
        Ok(())
    })
}
