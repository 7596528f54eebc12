//! Filesystem-backed bucket store.
//!
//! A bucket is a directory under the data root plus a small JSON record
//! (creation time, type, storage class, owner, tags) kept in a separate
//! metadata root so that emptying or recreating the data directory never
//! disturbs the bucket's own identity.

use super::BucketStore;
use crate::error::{EngineError, Result};
use crate::model::Bucket;
use crate::netfs;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use uuid::Uuid;

pub struct LocalBucketStore {
    data_root: PathBuf,
    meta_root: PathBuf,
    temp_prefix: String,
}

impl LocalBucketStore {
    pub fn new(
        data_root: impl Into<PathBuf>,
        meta_root: impl Into<PathBuf>,
        temp_prefix: impl Into<String>,
    ) -> Self {
        Self {
            data_root: data_root.into(),
            meta_root: meta_root.into(),
            temp_prefix: temp_prefix.into(),
        }
    }

    fn data_dir(&self, bucket: &str) -> PathBuf {
        self.data_root.join(bucket)
    }

    fn record_path(&self, bucket: &str) -> PathBuf {
        self.meta_root.join(format!("{bucket}.bucket.json"))
    }

    async fn write_record(&self, record: &Bucket) -> Result<()> {
        netfs::ensure_directory_exists(&self.meta_root).await?;
        let path = self.record_path(&record.name);
        let body = serde_json::to_vec_pretty(record).map_err(|e| EngineError::Internal(e.into()))?;
        let temp_path = self
            .meta_root
            .join(format!("{}{}", self.temp_prefix, Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&temp_path, &body).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(EngineError::Io(e));
        }
        tokio::fs::rename(&temp_path, &path).await.map_err(EngineError::Io)
    }

    async fn is_data_dir_empty(&self, bucket: &str) -> Result<bool> {
        let path = self.data_dir(bucket);
        let mut read_dir = match tokio::fs::read_dir(&path).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(EngineError::Io(e)),
        };
        Ok(read_dir.next_entry().await.map_err(EngineError::Io)?.is_none())
    }
}

impl BucketStore for LocalBucketStore {
    fn create<'a>(
        &'a self,
        bucket: &'a Bucket,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.data_dir(&bucket.name);
            match tokio::fs::create_dir(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Err(EngineError::BucketAlreadyExists {
                        bucket: bucket.name.clone(),
                    });
                }
                Err(e) => return Err(EngineError::Io(e)),
            }
            if let Err(e) = self.write_record(bucket).await {
                let _ = tokio::fs::remove_dir(&path).await;
                return Err(e);
            }
            Ok(())
        })
    }

    fn replace_record<'a>(
        &'a self,
        bucket: &'a Bucket,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !self.exists_sync(&bucket.name).await? {
                return Err(EngineError::NoSuchBucket {
                    bucket: bucket.name.clone(),
                });
            }
            self.write_record(bucket).await
        })
    }

    fn delete<'a>(
        &'a self,
        bucket: &'a str,
        force: bool,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !self.exists_sync(bucket).await? {
                return Err(EngineError::NoSuchBucket {
                    bucket: bucket.to_string(),
                });
            }
            if !force && !self.is_data_dir_empty(bucket).await? {
                return Err(EngineError::BucketNotEmpty {
                    bucket: bucket.to_string(),
                });
            }
            let data_dir = self.data_dir(bucket);
            match tokio::fs::remove_dir_all(&data_dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(EngineError::Io(e)),
            }
            match tokio::fs::remove_file(self.record_path(bucket)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(EngineError::Io(e)),
            }
            Ok(())
        })
    }

    fn exists<'a>(&'a self, bucket: &'a str) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move { self.exists_sync(bucket).await })
    }

    fn get<'a>(
        &'a self,
        bucket: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Bucket>>> + Send + 'a>> {
        Box::pin(async move {
            match tokio::fs::read(self.record_path(bucket)).await {
                Ok(bytes) => {
                    let record = serde_json::from_slice(&bytes)
                        .map_err(|e| EngineError::Internal(e.into()))?;
                    Ok(Some(record))
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(EngineError::Io(e)),
            }
        })
    }

    fn list(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Bucket>>> + Send + '_>> {
        Box::pin(async move {
            let mut read_dir = match tokio::fs::read_dir(&self.meta_root).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(EngineError::Io(e)),
            };
            let mut buckets = Vec::new();
            while let Some(entry) = read_dir.next_entry().await.map_err(EngineError::Io)? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&self.temp_prefix))
                    .unwrap_or(false)
                {
                    continue;
                }
                let bytes = tokio::fs::read(&path).await.map_err(EngineError::Io)?;
                let record: Bucket =
                    serde_json::from_slice(&bytes).map_err(|e| EngineError::Internal(e.into()))?;
                buckets.push(record);
            }
            buckets.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(buckets)
        })
    }
}

impl LocalBucketStore {
    async fn exists_sync(&self, bucket: &str) -> Result<bool> {
        tokio::fs::try_exists(self.data_dir(bucket))
            .await
            .map_err(EngineError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BucketType;
    use std::collections::HashMap;

    fn sample(name: &str) -> Bucket {
        Bucket {
            name: name.to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            bucket_type: BucketType::GeneralPurpose,
            storage_class: None,
            owner_id: Some("owner-1".to_string()),
            tags: HashMap::new(),
        }
    }

    fn store() -> (tempfile::TempDir, LocalBucketStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBucketStore::new(
            dir.path().join("data"),
            dir.path().join("meta"),
            ".lamina-tmp-",
        );
        (dir, store)
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let (_dir, store) = store();
        store.create(&sample("bucket-a")).await.unwrap();
        assert!(store.exists("bucket-a").await.unwrap());
        let fetched = store.get("bucket-a").await.unwrap().unwrap();
        assert_eq!(fetched.owner_id.as_deref(), Some("owner-1"));
    }

    #[tokio::test]
    async fn create_twice_fails_with_already_exists() {
        let (_dir, store) = store();
        store.create(&sample("bucket-a")).await.unwrap();
        let err = store.create(&sample("bucket-a")).await.unwrap_err();
        assert!(matches!(err, EngineError::BucketAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn delete_missing_bucket_fails_with_no_such_bucket() {
        let (_dir, store) = store();
        let err = store.delete("ghost", false).await.unwrap_err();
        assert!(matches!(err, EngineError::NoSuchBucket { .. }));
    }

    #[tokio::test]
    async fn delete_non_empty_without_force_fails() {
        let (dir, store) = store();
        store.create(&sample("bucket-a")).await.unwrap();
        tokio::fs::write(dir.path().join("data/bucket-a/obj.txt"), b"x")
            .await
            .unwrap();
        let err = store.delete("bucket-a", false).await.unwrap_err();
        assert!(matches!(err, EngineError::BucketNotEmpty { .. }));
    }

    #[tokio::test]
    async fn delete_non_empty_with_force_succeeds() {
        let (dir, store) = store();
        store.create(&sample("bucket-a")).await.unwrap();
        tokio::fs::write(dir.path().join("data/bucket-a/obj.txt"), b"x")
            .await
            .unwrap();
        store.delete("bucket-a", true).await.unwrap();
        assert!(!store.exists("bucket-a").await.unwrap());
        assert!(store.get("bucket-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replace_record_updates_tags() {
        let (_dir, store) = store();
        store.create(&sample("bucket-a")).await.unwrap();
        let mut updated = sample("bucket-a");
        updated.tags.insert("env".to_string(), "prod".to_string());
        store.replace_record(&updated).await.unwrap();
        let fetched = store.get("bucket-a").await.unwrap().unwrap();
        assert_eq!(fetched.tags.get("env"), Some(&"prod".to_string()));
    }

    #[tokio::test]
    async fn replace_record_on_missing_bucket_fails() {
        let (_dir, store) = store();
        let err = store.replace_record(&sample("ghost")).await.unwrap_err();
        assert!(matches!(err, EngineError::NoSuchBucket { .. }));
    }

    #[tokio::test]
    async fn list_returns_buckets_sorted_by_name() {
        let (_dir, store) = store();
        store.create(&sample("zeta")).await.unwrap();
        store.create(&sample("alpha")).await.unwrap();
        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
