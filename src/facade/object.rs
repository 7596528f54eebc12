//! Object facade: composes the data store, metadata store, and bucket
//! store behind the operations a caller actually wants — `PutObject`,
//! `GetObject`, `DeleteObjects`, `CopyObject`, `ListObjects`.

use crate::bucket::BucketStore;
use crate::chunked::BoxedChunkValidator;
use crate::config::BucketType;
use crate::data::ObjectDataStore;
use crate::error::{EngineError, Result};
use crate::lock::LockManager;
use crate::metadata::ObjectMetadataStore;
use crate::model::{
    ByteRange, ChecksumRequest, Checksums, ListResult, ObjectMetadataRecord, ObjectRecord,
};
use crate::path;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Maximum number of keys a single `DeleteMultiple` call may name.
const MAX_DELETE_MANY_KEYS: usize = 1000;

/// Which directive a `CopyObject` request carries for destination
/// metadata.
#[derive(Debug, Clone)]
pub enum CopyDirective {
    /// Duplicate the source object's metadata record as-is.
    Copy,
    /// Install caller-supplied metadata instead of the source's.
    Replace {
        content_type: String,
        user_metadata: HashMap<String, String>,
    },
}

/// Result of a `DeleteMultiple` call: two parallel lists, matching the
/// order keys were attempted in.
#[derive(Debug, Default)]
pub struct DeleteManyOutcome {
    pub deleted: Vec<String>,
    pub errors: Vec<(String, EngineError)>,
}

pub struct ObjectFacade {
    data: Arc<dyn ObjectDataStore>,
    metadata: Arc<dyn ObjectMetadataStore>,
    buckets: Arc<dyn BucketStore>,
    locks: Arc<dyn LockManager>,
    temp_prefix: String,
    inline_metadata_dir_name: String,
}

impl ObjectFacade {
    pub fn new(
        data: Arc<dyn ObjectDataStore>,
        metadata: Arc<dyn ObjectMetadataStore>,
        buckets: Arc<dyn BucketStore>,
        locks: Arc<dyn LockManager>,
        temp_prefix: impl Into<String>,
        inline_metadata_dir_name: impl Into<String>,
    ) -> Self {
        Self {
            data,
            metadata,
            buckets,
            locks,
            temp_prefix: temp_prefix.into(),
            inline_metadata_dir_name: inline_metadata_dir_name.into(),
        }
    }

    fn validate_key(&self, key: &str) -> Result<()> {
        path::validate_key(key, &self.temp_prefix, &self.inline_metadata_dir_name)
    }

    async fn require_bucket(&self, bucket: &str) -> Result<()> {
        if self.buckets.exists(bucket).await? {
            Ok(())
        } else {
            Err(EngineError::NoSuchBucket {
                bucket: bucket.to_string(),
            })
        }
    }

    fn lock_key(bucket: &str, key: &str) -> String {
        format!("{bucket}/{key}")
    }

    fn last_modified_string(time: std::time::SystemTime) -> String {
        DateTime::<Utc>::from(time).to_rfc3339()
    }

    fn merge_record(
        bucket: &str,
        key: &str,
        size: u64,
        last_modified: String,
        meta: ObjectMetadataRecord,
    ) -> ObjectRecord {
        ObjectRecord {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            last_modified,
            etag: meta.etag,
            content_type: meta.content_type,
            owner_id: meta.owner_id,
            owner_display_name: meta.owner_display_name,
            user_metadata: meta.user_metadata,
            checksums: meta.checksums,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn store<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        source: Pin<Box<dyn AsyncRead + Send + 'a>>,
        content_type: String,
        user_metadata: HashMap<String, String>,
        owner_id: Option<String>,
        owner_display_name: Option<String>,
        chunk_validator: Option<BoxedChunkValidator>,
        checksum_request: Option<ChecksumRequest>,
    ) -> Result<ObjectRecord> {
        self.validate_key(key)?;
        self.require_bucket(bucket).await?;
        let _guard = self.locks.write(&Self::lock_key(bucket, key)).await?;

        let outcome = self
            .data
            .store(bucket, key, source, chunk_validator, checksum_request)
            .await?;
        let record = ObjectMetadataRecord {
            etag: outcome.etag,
            content_type,
            owner_id,
            owner_display_name,
            user_metadata,
            checksums: outcome.checksums,
        };
        let record = self.metadata.store(bucket, key, record).await?;
        let info = self
            .data
            .info(bucket, key)
            .await?
            .ok_or_else(|| EngineError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        Ok(Self::merge_record(
            bucket,
            key,
            info.size,
            Self::last_modified_string(info.last_modified),
            record,
        ))
    }

    pub async fn read<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        dest: Pin<Box<dyn AsyncWrite + Send + 'a>>,
        range: Option<ByteRange>,
    ) -> Result<Option<ObjectRecord>> {
        self.validate_key(key)?;
        self.require_bucket(bucket).await?;
        let _guard = self.locks.read(&Self::lock_key(bucket, key)).await?;

        if !self.data.read(bucket, key, dest, range).await? {
            return Ok(None);
        }
        self.head_locked(bucket, key).await
    }

    /// `HeadObject`: metadata plus size/last-modified, without reading
    /// the body.
    pub async fn head<'a>(&'a self, bucket: &'a str, key: &'a str) -> Result<Option<ObjectRecord>> {
        self.validate_key(key)?;
        self.require_bucket(bucket).await?;
        let _guard = self.locks.read(&Self::lock_key(bucket, key)).await?;
        self.head_locked(bucket, key).await
    }

    async fn head_locked(&self, bucket: &str, key: &str) -> Result<Option<ObjectRecord>> {
        let info = match self.data.info(bucket, key).await? {
            Some(info) => info,
            None => return Ok(None),
        };
        let meta = match self.metadata.get(bucket, key).await? {
            Some(meta) => meta,
            None => {
                // Orphan data with no metadata sidecar: recover with a
                // minimal record rather than surfacing an error.
                ObjectMetadataRecord {
                    etag: self
                        .data
                        .compute_etag(bucket, key)
                        .await?
                        .unwrap_or_default(),
                    content_type: "application/octet-stream".to_string(),
                    owner_id: None,
                    owner_display_name: None,
                    user_metadata: HashMap::new(),
                    checksums: Checksums::default(),
                }
            }
        };
        Ok(Some(Self::merge_record(
            bucket,
            key,
            info.size,
            Self::last_modified_string(info.last_modified),
            meta,
        )))
    }

    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        if self.validate_key(key).is_err() {
            return Ok(false);
        }
        self.require_bucket(bucket).await?;
        self.data.exists(bucket, key).await
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
        self.validate_key(key)?;
        self.require_bucket(bucket).await?;
        let _guard = self.locks.write(&Self::lock_key(bucket, key)).await?;
        let existed = self.data.delete(bucket, key).await?;
        self.metadata.delete(bucket, key).await?;
        Ok(existed)
    }

    /// `DeleteMultiple`: ordered, capped at 1000. `quiet` suppresses
    /// successes from the returned `deleted` list.
    pub async fn delete_many(
        &self,
        bucket: &str,
        keys: &[String],
        quiet: bool,
    ) -> Result<DeleteManyOutcome> {
        if keys.len() > MAX_DELETE_MANY_KEYS {
            return Err(EngineError::TooManyKeys);
        }
        self.require_bucket(bucket).await?;
        let mut outcome = DeleteManyOutcome::default();
        for key in keys {
            match self.delete(bucket, key).await {
                Ok(_) => {
                    if !quiet {
                        outcome.deleted.push(key.clone());
                    }
                }
                Err(e) => outcome.errors.push((key.clone(), e)),
            }
        }
        Ok(outcome)
    }

    pub async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        directive: CopyDirective,
    ) -> Result<Option<ObjectRecord>> {
        self.validate_key(src_key)?;
        self.validate_key(dst_key)?;
        self.require_bucket(src_bucket).await?;
        self.require_bucket(dst_bucket).await?;

        let _src_guard = self.locks.read(&Self::lock_key(src_bucket, src_key)).await?;
        let _dst_guard = self.locks.write(&Self::lock_key(dst_bucket, dst_key)).await?;

        let copied = self
            .data
            .copy(src_bucket, src_key, dst_bucket, dst_key)
            .await?;
        let outcome = match copied {
            Some(outcome) => outcome,
            None => return Ok(None),
        };

        let dest_record = match directive {
            CopyDirective::Copy => {
                let mut source_meta = self
                    .metadata
                    .get(src_bucket, src_key)
                    .await?
                    .unwrap_or_else(|| ObjectMetadataRecord {
                        etag: outcome.etag.clone(),
                        content_type: "application/octet-stream".to_string(),
                        owner_id: None,
                        owner_display_name: None,
                        user_metadata: HashMap::new(),
                        checksums: Checksums::default(),
                    });
                source_meta.etag = outcome.etag.clone();
                source_meta
            }
            CopyDirective::Replace {
                content_type,
                user_metadata,
            } => ObjectMetadataRecord {
                etag: outcome.etag.clone(),
                content_type,
                owner_id: None,
                owner_display_name: None,
                user_metadata,
                checksums: Checksums::default(),
            },
        };
        let stored = self.metadata.store(dst_bucket, dst_key, dest_record).await?;
        let info = self
            .data
            .info(dst_bucket, dst_key)
            .await?
            .ok_or_else(|| EngineError::NoSuchKey {
                bucket: dst_bucket.to_string(),
                key: dst_key.to_string(),
            })?;
        Ok(Some(Self::merge_record(
            dst_bucket,
            dst_key,
            info.size,
            Self::last_modified_string(info.last_modified),
            stored,
        )))
    }

    pub async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> Result<ListResult> {
        let bucket_record =
            self.buckets
                .get(bucket)
                .await?
                .ok_or_else(|| EngineError::NoSuchBucket {
                    bucket: bucket.to_string(),
                })?;
        if bucket_record.bucket_type == BucketType::Directory && start_after.is_some() {
            return Err(EngineError::InvalidArgument {
                message:
                    "start-after pagination implies lexicographic order, which directory buckets do not provide"
                        .to_string(),
            });
        }
        self.data
            .list(
                bucket,
                bucket_record.bucket_type,
                prefix,
                delimiter,
                start_after,
                max_keys,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::LocalBucketStore;
    use crate::config::BucketType;
    use crate::data::LocalObjectDataStore;
    use crate::lock::InProcessLockManager;
    use crate::metadata::SeparateDirectoryMetadataStore;
    use crate::model::Bucket;
    use crate::netfs::RetryPolicy;
    use std::io::Cursor;

    fn facade() -> (tempfile::TempDir, ObjectFacade) {
        let dir = tempfile::tempdir().unwrap();
        let locks: Arc<dyn LockManager> = Arc::new(InProcessLockManager::new());
        let data: Arc<dyn ObjectDataStore> = Arc::new(LocalObjectDataStore::new(
            dir.path().join("data"),
            ".lamina-tmp-",
            ".lamina-meta",
            RetryPolicy::new(crate::config::NetworkMode::None, 0, 10),
            locks.clone(),
        ));
        let metadata: Arc<dyn ObjectMetadataStore> = Arc::new(SeparateDirectoryMetadataStore::new(
            dir.path().join("meta"),
            ".lamina-tmp-",
            ".lamina-meta",
        ));
        let buckets: Arc<dyn BucketStore> = Arc::new(LocalBucketStore::new(
            dir.path().join("data"),
            dir.path().join("meta/_buckets"),
            ".lamina-tmp-",
        ));
        let facade = ObjectFacade::new(data, metadata, buckets, locks, ".lamina-tmp-", ".lamina-meta");
        (dir, facade)
    }

    async fn make_bucket(facade: &ObjectFacade, name: &str) {
        facade
            .buckets
            .create(&Bucket {
                name: name.to_string(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                bucket_type: BucketType::GeneralPurpose,
                storage_class: None,
                owner_id: None,
                tags: HashMap::new(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn store_then_read_roundtrips() {
        let (_dir, facade) = facade();
        make_bucket(&facade, "b").await;

        let source: Pin<Box<dyn AsyncRead + Send>> = Box::pin(Cursor::new(b"hello".to_vec()));
        let record = facade
            .store(
                "b",
                "k.txt",
                source,
                "text/plain".to_string(),
                HashMap::new(),
                None,
                None,
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(record.size, 5);
        assert_eq!(record.etag, "5d41402abc4b2a76b9719d911017c592");

        let mut buf = Vec::new();
        let found = facade
            .read("b", "k.txt", Box::pin(&mut buf), None)
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(buf, b"hello");
    }

    #[tokio::test]
    async fn store_into_missing_bucket_fails() {
        let (_dir, facade) = facade();
        let source: Pin<Box<dyn AsyncRead + Send>> = Box::pin(Cursor::new(b"x".to_vec()));
        let err = facade
            .store(
                "ghost",
                "k.txt",
                source,
                "text/plain".to_string(),
                HashMap::new(),
                None,
                None,
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchBucket { .. }));
    }

    #[tokio::test]
    async fn store_rejects_forbidden_key() {
        let (_dir, facade) = facade();
        make_bucket(&facade, "b").await;
        let source: Pin<Box<dyn AsyncRead + Send>> = Box::pin(Cursor::new(b"x".to_vec()));
        let err = facade
            .store(
                "b",
                ".lamina-tmp-abc",
                source,
                "text/plain".to_string(),
                HashMap::new(),
                None,
                None,
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidObjectName { .. }));
        assert!(!facade.exists("b", ".lamina-tmp-abc").await.unwrap());
    }

    #[tokio::test]
    async fn delete_many_reports_errors_for_missing_keys() {
        let (_dir, facade) = facade();
        make_bucket(&facade, "b").await;
        for key in ["a.txt", "c.txt"] {
            let source: Pin<Box<dyn AsyncRead + Send>> = Box::pin(Cursor::new(b"x".to_vec()));
            facade
                .store(
                    "b",
                    key,
                    source,
                    "text/plain".to_string(),
                    HashMap::new(),
                    None,
                    None,
                    None,
                    None,
                )
                .await
                .unwrap();
        }
        let keys = vec!["a.txt".to_string(), "b.txt".to_string(), "c.txt".to_string()];
        let outcome = facade.delete_many("b", &keys, false).await.unwrap();
        assert_eq!(outcome.deleted, vec!["a.txt".to_string(), "c.txt".to_string()]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].0, "b.txt");
    }

    #[tokio::test]
    async fn delete_many_quiet_suppresses_successes() {
        let (_dir, facade) = facade();
        make_bucket(&facade, "b").await;
        let source: Pin<Box<dyn AsyncRead + Send>> = Box::pin(Cursor::new(b"x".to_vec()));
        facade
            .store(
                "b",
                "a.txt",
                source,
                "text/plain".to_string(),
                HashMap::new(),
                None,
                None,
                None,
                None,
            )
            .await
            .unwrap();
        let keys = vec!["a.txt".to_string(), "missing.txt".to_string()];
        let outcome = facade.delete_many("b", &keys, true).await.unwrap();
        assert!(outcome.deleted.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }

    #[tokio::test]
    async fn copy_with_copy_directive_duplicates_metadata() {
        let (_dir, facade) = facade();
        make_bucket(&facade, "b").await;
        let source: Pin<Box<dyn AsyncRead + Send>> = Box::pin(Cursor::new(b"payload".to_vec()));
        let mut user_metadata = HashMap::new();
        user_metadata.insert("x-custom".to_string(), "1".to_string());
        facade
            .store(
                "b",
                "src.txt",
                source,
                "text/plain".to_string(),
                user_metadata.clone(),
                None,
                None,
                None,
                None,
            )
            .await
            .unwrap();

        let copied = facade
            .copy("b", "src.txt", "b", "dst.txt", CopyDirective::Copy)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(copied.user_metadata, user_metadata);
        assert_eq!(copied.content_type, "text/plain");
    }

    #[tokio::test]
    async fn copy_with_replace_directive_installs_new_metadata() {
        let (_dir, facade) = facade();
        make_bucket(&facade, "b").await;
        let source: Pin<Box<dyn AsyncRead + Send>> = Box::pin(Cursor::new(b"payload".to_vec()));
        facade
            .store(
                "b",
                "src.txt",
                source,
                "text/plain".to_string(),
                HashMap::new(),
                None,
                None,
                None,
                None,
            )
            .await
            .unwrap();

        let mut replacement = HashMap::new();
        replacement.insert("new-key".to_string(), "new-value".to_string());
        let copied = facade
            .copy(
                "b",
                "src.txt",
                "b",
                "dst.txt",
                CopyDirective::Replace {
                    content_type: "application/json".to_string(),
                    user_metadata: replacement.clone(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(copied.content_type, "application/json");
        assert_eq!(copied.user_metadata, replacement);
    }

    #[tokio::test]
    async fn list_on_directory_bucket_rejects_start_after() {
        let (_dir, facade) = facade();
        facade
            .buckets
            .create(&Bucket {
                name: "dirbucket".to_string(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                bucket_type: BucketType::Directory,
                storage_class: None,
                owner_id: None,
                tags: HashMap::new(),
            })
            .await
            .unwrap();

        let err = facade
            .list("dirbucket", "", None, Some("a"), 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
    }
}
