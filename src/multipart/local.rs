//! Filesystem-staged implementation of [`MultipartUploadStore`].

use super::{CompletedPart, MultipartUploadStore};
use crate::checksum::{self, StreamingChecksum};
use crate::chunked::{self, BoxedChunkValidator};
use crate::data::ObjectDataStore;
use crate::error::{EngineError, Result};
use crate::model::{ChecksumAlgorithm, Checksums, MultipartUpload, StoreOutcome, UploadPart};
use crate::netfs::{self, RetryPolicy};
use crate::path::MULTIPART_STAGING_DIR_NAME;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Stages multipart parts under `<staging-root>/_multipart_uploads/<upload-id>/`
/// and completes uploads by handing the assembled byte streams to an
/// [`ObjectDataStore`].
pub struct LocalMultipartUploadStore {
    staging_root: PathBuf,
    temp_prefix: String,
    retry_policy: RetryPolicy,
    data_store: Arc<dyn ObjectDataStore>,
}

impl LocalMultipartUploadStore {
    pub fn new(
        staging_root: impl Into<PathBuf>,
        temp_prefix: impl Into<String>,
        retry_policy: RetryPolicy,
        data_store: Arc<dyn ObjectDataStore>,
    ) -> Self {
        Self {
            staging_root: staging_root.into(),
            temp_prefix: temp_prefix.into(),
            retry_policy,
            data_store,
        }
    }

    fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.staging_root.join(MULTIPART_STAGING_DIR_NAME).join(upload_id)
    }

    fn part_path(&self, upload_id: &str, part_number: u32) -> PathBuf {
        self.upload_dir(upload_id).join(format!("part_{part_number}"))
    }

    fn metadata_path(&self, upload_id: &str) -> PathBuf {
        self.upload_dir(upload_id).join("upload.metadata.json")
    }

    async fn require_upload_dir(&self, upload_id: &str) -> Result<PathBuf> {
        let dir = self.upload_dir(upload_id);
        if !tokio::fs::try_exists(&dir).await.map_err(EngineError::Io)? {
            return Err(EngineError::NoSuchUpload {
                upload_id: upload_id.to_string(),
            });
        }
        Ok(dir)
    }

    async fn read_metadata(&self, upload_id: &str) -> Result<MultipartUpload> {
        let path = self.metadata_path(upload_id);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::NoSuchUpload {
                    upload_id: upload_id.to_string(),
                }
            } else {
                EngineError::Io(e)
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|e| EngineError::Internal(e.into()))
    }

    fn temp_name(&self) -> String {
        format!("{}{}", self.temp_prefix, Uuid::new_v4().simple())
    }
}

impl MultipartUploadStore for LocalMultipartUploadStore {
    fn initiate<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        content_type: String,
        user_metadata: HashMap<String, String>,
        checksum_algorithm: Option<ChecksumAlgorithm>,
    ) -> Pin<Box<dyn Future<Output = Result<MultipartUpload>> + Send + 'a>> {
        Box::pin(async move {
            let upload_id = Uuid::new_v4().to_string();
            let dir = self.upload_dir(&upload_id);
            netfs::ensure_directory_exists(&dir).await?;

            let record = MultipartUpload {
                upload_id: upload_id.clone(),
                bucket: bucket.to_string(),
                key: key.to_string(),
                initiated_at: chrono::Utc::now().to_rfc3339(),
                content_type,
                user_metadata,
                checksum_algorithm,
            };

            let body =
                serde_json::to_vec_pretty(&record).map_err(|e| EngineError::Internal(e.into()))?;
            let temp_path = dir.join(self.temp_name());
            tokio::fs::write(&temp_path, &body).await.map_err(EngineError::Io)?;
            tokio::fs::rename(&temp_path, self.metadata_path(&upload_id))
                .await
                .map_err(EngineError::Io)?;

            Ok(record)
        })
    }

    fn store_part<'a>(
        &'a self,
        upload_id: &'a str,
        part_number: u32,
        mut source: Pin<Box<dyn AsyncRead + Send + 'a>>,
        chunk_validator: Option<BoxedChunkValidator>,
    ) -> Pin<Box<dyn Future<Output = Result<UploadPart>> + Send + 'a>> {
        Box::pin(async move {
            let dir = self.require_upload_dir(upload_id).await?;
            let upload = self.read_metadata(upload_id).await?;
            let final_path = dir.join(format!("part_{part_number}"));
            let temp_path = dir.join(self.temp_name());

            let mut file = tokio::fs::File::create(&temp_path).await.map_err(EngineError::Io)?;
            let mut accumulator = upload
                .checksum_algorithm
                .map(|algo| StreamingChecksum::new(&[algo]));
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
                let mut buf = [0u8; 8192];
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
            let etag = checksum::md5_etag_of_file(&temp_path)
                .await
                .map_err(EngineError::Io)?;

            let policy = self.retry_policy;
            if let Err(e) = netfs::atomic_move(policy.network_mode, &temp_path, &final_path).await
            {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e);
            }

            let metadata = tokio::fs::metadata(&final_path).await.map_err(EngineError::Io)?;
            Ok(UploadPart {
                part_number,
                size,
                etag,
                last_modified: chrono::DateTime::<chrono::Utc>::from(
                    metadata.modified().map_err(EngineError::Io)?,
                )
                .to_rfc3339(),
                checksums,
            })
        })
    }

    fn list_parts<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UploadPart>>> + Send + 'a>> {
        Box::pin(async move {
            let dir = self.require_upload_dir(upload_id).await?;
            let mut read_dir = tokio::fs::read_dir(&dir).await.map_err(EngineError::Io)?;
            let mut parts = Vec::new();
            while let Some(entry) = read_dir.next_entry().await.map_err(EngineError::Io)? {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                let Some(number_str) = name.strip_prefix("part_") else {
                    continue;
                };
                let Ok(part_number) = number_str.parse::<u32>() else {
                    continue;
                };
                let path = entry.path();
                let metadata = entry.metadata().await.map_err(EngineError::Io)?;
                let etag = checksum::md5_etag_of_file(&path).await.map_err(EngineError::Io)?;
                parts.push(UploadPart {
                    part_number,
                    size: metadata.len(),
                    etag,
                    last_modified: chrono::DateTime::<chrono::Utc>::from(
                        metadata.modified().map_err(EngineError::Io)?,
                    )
                    .to_rfc3339(),
                    checksums: Checksums::default(),
                });
            }
            parts.sort_by_key(|p| p.part_number);
            Ok(parts)
        })
    }

    fn complete<'a>(
        &'a self,
        upload_id: &'a str,
        parts: Vec<CompletedPart>,
    ) -> Pin<Box<dyn Future<Output = Result<StoreOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let dir = self.require_upload_dir(upload_id).await?;
            let upload = self.read_metadata(upload_id).await?;

            let mut previous = 0u32;
            for part in &parts {
                if part.part_number <= previous && previous != 0 {
                    return Err(EngineError::InvalidPartOrder);
                }
                previous = part.part_number;
            }

            let mut raw_digests = Vec::with_capacity(parts.len());
            let mut sources: Vec<Pin<Box<dyn AsyncRead + Send + 'a>>> = Vec::with_capacity(parts.len());
            for part in &parts {
                let path = dir.join(format!("part_{}", part.part_number));
                let bytes = tokio::fs::read(&path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        EngineError::InvalidPart {
                            message: format!("part {} was not found", part.part_number),
                        }
                    } else {
                        EngineError::Io(e)
                    }
                })?;

                let actual_etag = checksum::md5_hex(&bytes);
                let expected = part.expected_etag.trim_matches('"');
                if actual_etag != expected {
                    return Err(EngineError::InvalidPart {
                        message: format!(
                            "part {} etag mismatch: expected {expected}, got {actual_etag}",
                            part.part_number
                        ),
                    });
                }
                raw_digests.push(checksum::md5_raw(&bytes));
                sources.push(Box::pin(std::io::Cursor::new(bytes)));
            }

            let outcome = self
                .data_store
                .store_from_parts(&upload.bucket, &upload.key, sources)
                .await?;

            let composite_etag = checksum::multipart_etag(&raw_digests);
            tokio::fs::remove_dir_all(&dir).await.map_err(EngineError::Io)?;

            Ok(StoreOutcome {
                size: outcome.size,
                etag: composite_etag,
                checksums: Checksums::default(),
            })
        })
    }

    fn abort<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let dir = self.upload_dir(upload_id);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(EngineError::Io(e)),
            }
        })
    }
}
