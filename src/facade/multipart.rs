//! Multipart facade: forbidden-key policy and bucket existence on top
//! of [`MultipartUploadStore`].

use crate::bucket::BucketStore;
use crate::chunked::BoxedChunkValidator;
use crate::error::{EngineError, Result};
use crate::model::{ChecksumAlgorithm, MultipartUpload, StoreOutcome, UploadPart};
use crate::multipart::{CompletedPart, MultipartUploadStore};
use crate::path;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

pub struct MultipartFacade {
    store: Arc<dyn MultipartUploadStore>,
    buckets: Arc<dyn BucketStore>,
    temp_prefix: String,
    inline_metadata_dir_name: String,
}

impl MultipartFacade {
    pub fn new(
        store: Arc<dyn MultipartUploadStore>,
        buckets: Arc<dyn BucketStore>,
        temp_prefix: impl Into<String>,
        inline_metadata_dir_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            buckets,
            temp_prefix: temp_prefix.into(),
            inline_metadata_dir_name: inline_metadata_dir_name.into(),
        }
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

    pub async fn initiate(
        &self,
        bucket: &str,
        key: &str,
        content_type: String,
        user_metadata: HashMap<String, String>,
        checksum_algorithm: Option<ChecksumAlgorithm>,
    ) -> Result<MultipartUpload> {
        path::validate_key(key, &self.temp_prefix, &self.inline_metadata_dir_name)?;
        self.require_bucket(bucket).await?;
        self.store
            .initiate(bucket, key, content_type, user_metadata, checksum_algorithm)
            .await
    }

    pub async fn store_part<'a>(
        &'a self,
        upload_id: &'a str,
        part_number: u32,
        source: Pin<Box<dyn AsyncRead + Send + 'a>>,
        chunk_validator: Option<BoxedChunkValidator>,
    ) -> Result<UploadPart> {
        self.store
            .store_part(upload_id, part_number, source, chunk_validator)
            .await
    }

    pub async fn list_parts(&self, upload_id: &str) -> Result<Vec<UploadPart>> {
        self.store.list_parts(upload_id).await
    }

    pub async fn complete(
        &self,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<StoreOutcome> {
        self.store.complete(upload_id, parts).await
    }

    pub async fn abort(&self, upload_id: &str) -> Result<()> {
        self.store.abort(upload_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::LocalBucketStore;
    use crate::config::{BucketType, NetworkMode};
    use crate::data::LocalObjectDataStore;
    use crate::lock::InProcessLockManager;
    use crate::model::Bucket;
    use crate::multipart::LocalMultipartUploadStore;
    use crate::netfs::RetryPolicy;
    use std::io::Cursor;

    fn facade() -> (tempfile::TempDir, MultipartFacade) {
        let dir = tempfile::tempdir().unwrap();
        let locks: Arc<dyn crate::lock::LockManager> = Arc::new(InProcessLockManager::new());
        let data: Arc<dyn crate::data::ObjectDataStore> = Arc::new(LocalObjectDataStore::new(
            dir.path().join("data"),
            ".lamina-tmp-",
            ".lamina-meta",
            RetryPolicy::new(NetworkMode::None, 0, 10),
            locks,
        ));
        let multipart_store: Arc<dyn MultipartUploadStore> = Arc::new(LocalMultipartUploadStore::new(
            dir.path().join("data"),
            ".lamina-tmp-",
            RetryPolicy::new(NetworkMode::None, 0, 10),
            data,
        ));
        let buckets: Arc<dyn BucketStore> = Arc::new(LocalBucketStore::new(
            dir.path().join("data"),
            dir.path().join("meta/_buckets"),
            ".lamina-tmp-",
        ));
        let facade = MultipartFacade::new(multipart_store, buckets, ".lamina-tmp-", ".lamina-meta");
        (dir, facade)
    }

    async fn make_bucket(facade: &MultipartFacade, name: &str) {
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
    async fn initiate_into_missing_bucket_fails() {
        let (_dir, facade) = facade();
        let err = facade
            .initiate("ghost", "k.txt", "text/plain".to_string(), HashMap::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchBucket { .. }));
    }

    #[tokio::test]
    async fn initiate_rejects_forbidden_key() {
        let (_dir, facade) = facade();
        make_bucket(&facade, "b").await;
        let err = facade
            .initiate(
                "b",
                ".lamina-tmp-abc",
                "text/plain".to_string(),
                HashMap::new(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidObjectName { .. }));
    }

    #[tokio::test]
    async fn full_roundtrip_through_facade() {
        let (_dir, facade) = facade();
        make_bucket(&facade, "b").await;
        let upload = facade
            .initiate("b", "k.txt", "text/plain".to_string(), HashMap::new(), None)
            .await
            .unwrap();

        let part = facade
            .store_part(&upload.upload_id, 1, Box::pin(Cursor::new(b"hello".to_vec())), None)
            .await
            .unwrap();

        let outcome = facade
            .complete(
                &upload.upload_id,
                vec![CompletedPart {
                    part_number: 1,
                    expected_etag: part.etag,
                }],
            )
            .await
            .unwrap();
        assert_eq!(outcome.size, 5);
    }
}
