//! Bucket facade: bucket-name validation plus the lifecycle operations
//! an HTTP layer exposes directly (`CreateBucket`, `DeleteBucket`,
//! `HeadBucket`, `GetBucketMetadata`, `UpdateTags`, `ListBuckets`).

use crate::bucket::BucketStore;
use crate::config::BucketDefaultsConfig;
use crate::error::{EngineError, Result};
use crate::model::Bucket;
use crate::path;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

pub struct BucketFacade {
    buckets: Arc<dyn BucketStore>,
    inline_metadata_dir_name: String,
    defaults: BucketDefaultsConfig,
}

impl BucketFacade {
    pub fn new(
        buckets: Arc<dyn BucketStore>,
        inline_metadata_dir_name: impl Into<String>,
        defaults: BucketDefaultsConfig,
    ) -> Self {
        Self {
            buckets,
            inline_metadata_dir_name: inline_metadata_dir_name.into(),
            defaults,
        }
    }

    pub async fn create(&self, name: &str, owner_id: Option<String>) -> Result<Bucket> {
        path::validate_bucket_name(name, &self.inline_metadata_dir_name)?;
        let bucket = Bucket {
            name: name.to_string(),
            created_at: Utc::now().to_rfc3339(),
            bucket_type: self.defaults.r#type,
            storage_class: Some(self.defaults.storage_class.clone()),
            owner_id,
            tags: HashMap::new(),
        };
        self.buckets.create(&bucket).await?;
        Ok(bucket)
    }

    /// Non-forced deletion of a non-empty bucket fails with
    /// `BucketNotEmpty`.
    pub async fn delete(&self, name: &str, force: bool) -> Result<()> {
        self.buckets.delete(name, force).await
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        self.buckets.exists(name).await
    }

    pub async fn head(&self, name: &str) -> Result<Option<Bucket>> {
        self.buckets.get(name).await
    }

    pub async fn get_metadata(&self, name: &str) -> Result<Bucket> {
        self.buckets
            .get(name)
            .await?
            .ok_or_else(|| EngineError::NoSuchBucket {
                bucket: name.to_string(),
            })
    }

    pub async fn update_tags(&self, name: &str, tags: HashMap<String, String>) -> Result<Bucket> {
        let mut bucket = self.get_metadata(name).await?;
        bucket.tags = tags;
        self.buckets.replace_record(&bucket).await?;
        Ok(bucket)
    }

    pub async fn list(&self) -> Result<Vec<Bucket>> {
        self.buckets.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::LocalBucketStore;

    fn facade() -> (tempfile::TempDir, BucketFacade) {
        let dir = tempfile::tempdir().unwrap();
        let buckets: Arc<dyn BucketStore> = Arc::new(LocalBucketStore::new(
            dir.path().join("data"),
            dir.path().join("meta/_buckets"),
            ".lamina-tmp-",
        ));
        let facade = BucketFacade::new(buckets, ".lamina-meta", BucketDefaultsConfig::default());
        (dir, facade)
    }

    #[tokio::test]
    async fn create_then_head_roundtrips() {
        let (_dir, facade) = facade();
        facade.create("my-bucket", Some("owner-1".to_string())).await.unwrap();
        let found = facade.head("my-bucket").await.unwrap().unwrap();
        assert_eq!(found.owner_id.as_deref(), Some("owner-1"));
    }

    #[tokio::test]
    async fn create_rejects_name_equal_to_inline_metadata_dir() {
        let (_dir, facade) = facade();
        let err = facade.create(".lamina-meta", None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidBucketName { .. }));
    }

    #[tokio::test]
    async fn update_tags_persists() {
        let (_dir, facade) = facade();
        facade.create("my-bucket", None).await.unwrap();
        let mut tags = HashMap::new();
        tags.insert("env".to_string(), "prod".to_string());
        facade.update_tags("my-bucket", tags.clone()).await.unwrap();
        let fetched = facade.get_metadata("my-bucket").await.unwrap();
        assert_eq!(fetched.tags, tags);
    }

    #[tokio::test]
    async fn get_metadata_on_missing_bucket_fails() {
        let (_dir, facade) = facade();
        let err = facade.get_metadata("ghost").await.unwrap_err();
        assert!(matches!(err, EngineError::NoSuchBucket { .. }));
    }
}
