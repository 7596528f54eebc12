//! Inline metadata backend: sidecars live next to the data they
//! describe, under a reserved per-directory subdirectory.
//!
//! `<data-root>/<bucket>/<dir-of-key>/.lamina-meta/<filename>.json`

use super::ObjectMetadataStore;
use crate::error::{EngineError, Result};
use crate::model::ObjectMetadataRecord;
use crate::netfs;
use crate::path;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use uuid::Uuid;

pub struct InlineMetadataStore {
    data_root: PathBuf,
    temp_prefix: String,
    inline_metadata_dir_name: String,
}

impl InlineMetadataStore {
    pub fn new(
        data_root: impl Into<PathBuf>,
        temp_prefix: impl Into<String>,
        inline_metadata_dir_name: impl Into<String>,
    ) -> Self {
        Self {
            data_root: data_root.into(),
            temp_prefix: temp_prefix.into(),
            inline_metadata_dir_name: inline_metadata_dir_name.into(),
        }
    }

    fn sidecar_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let bucket_root = self.data_root.join(bucket);
        let object_path = path::resolve_under(&bucket_root, key)?;
        let file_name = object_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();
        let dir_of_key = object_path.parent().unwrap_or(&bucket_root).to_path_buf();
        Ok(dir_of_key
            .join(&self.inline_metadata_dir_name)
            .join(format!("{file_name}.json")))
    }

    async fn write_json(&self, path: &PathBuf, record: &ObjectMetadataRecord) -> Result<()> {
        if let Some(parent) = path.parent() {
            netfs::ensure_directory_exists(parent).await?;
        }
        let body = serde_json::to_vec_pretty(record).map_err(|e| EngineError::Internal(e.into()))?;
        let temp_path = path.with_file_name(format!(
            "{}{}",
            self.temp_prefix,
            Uuid::new_v4().simple()
        ));
        if let Err(e) = tokio::fs::write(&temp_path, &body).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(EngineError::Io(e));
        }
        tokio::fs::rename(&temp_path, path).await.map_err(EngineError::Io)
    }
}

impl ObjectMetadataStore for InlineMetadataStore {
    fn store<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        record: ObjectMetadataRecord,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectMetadataRecord>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.sidecar_path(bucket, key)?;
            self.write_json(&path, &record).await?;
            Ok(record)
        })
    }

    fn get<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ObjectMetadataRecord>>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.sidecar_path(bucket, key)?;
            match tokio::fs::read(&path).await {
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

    fn delete<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.sidecar_path(bucket, key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(EngineError::Io(e)),
            }
            // Clean up the now-possibly-empty `.lamina-meta` directory and
            // any empty ancestors, stopping at the bucket root.
            if let Some(meta_dir) = path.parent() {
                let bucket_root = self.data_root.join(bucket);
                netfs::delete_directory_if_empty(meta_dir, &bucket_root).await?;
            }
            Ok(())
        })
    }

    fn exists<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.sidecar_path(bucket, key)?;
            Ok(tokio::fs::try_exists(&path).await.map_err(EngineError::Io)?)
        })
    }

    fn list_all_keys<'a>(
        &'a self,
        bucket: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(async move {
            let bucket_root = self.data_root.join(bucket);
            let mut keys = Vec::new();
            walk_inline_sidecars(
                &bucket_root,
                &bucket_root,
                &self.inline_metadata_dir_name,
                &mut keys,
            )
            .await?;
            Ok(keys)
        })
    }

    fn is_valid_key(&self, key: &str) -> bool {
        path::validate_key(key, &self.temp_prefix, &self.inline_metadata_dir_name).is_ok()
    }
}

fn walk_inline_sidecars<'a>(
    dir: &'a std::path::Path,
    bucket_root: &'a std::path::Path,
    inline_metadata_dir_name: &'a str,
    out: &'a mut Vec<String>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut read_dir = match tokio::fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(EngineError::Io(e)),
        };
        while let Some(entry) = read_dir.next_entry().await.map_err(EngineError::Io)? {
            let file_type = entry.file_type().await.map_err(EngineError::Io)?;
            let path = entry.path();
            if !file_type.is_dir() {
                continue;
            }
            if entry.file_name().to_string_lossy() == inline_metadata_dir_name {
                let mut sidecars = tokio::fs::read_dir(&path).await.map_err(EngineError::Io)?;
                while let Some(sidecar) = sidecars.next_entry().await.map_err(EngineError::Io)? {
                    let sidecar_path = sidecar.path();
                    if sidecar_path.extension().and_then(|e| e.to_str()) == Some("json") {
                        let file_stem = sidecar_path
                            .file_stem()
                            .and_then(|s| s.to_str())
                            .unwrap_or("");
                        let key_dir = dir.strip_prefix(bucket_root).unwrap_or(dir);
                        let key = if key_dir.as_os_str().is_empty() {
                            file_stem.to_string()
                        } else {
                            format!(
                                "{}/{}",
                                key_dir.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"),
                                file_stem
                            )
                        };
                        out.push(key);
                    }
                }
            } else {
                walk_inline_sidecars(&path, bucket_root, inline_metadata_dir_name, out).await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::test_support::sample_record;

    fn store() -> (tempfile::TempDir, InlineMetadataStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = InlineMetadataStore::new(dir.path(), ".lamina-tmp-", ".lamina-meta");
        (dir, store)
    }

    #[tokio::test]
    async fn store_then_get_roundtrips() {
        let (_dir, store) = store();
        let record = sample_record();
        store.store("b", "a/b.txt", record.clone()).await.unwrap();
        let fetched = store.get("b", "a/b.txt").await.unwrap().unwrap();
        assert_eq!(fetched.etag, record.etag);
    }

    #[tokio::test]
    async fn sidecar_lives_under_reserved_directory() {
        let (dir, store) = store();
        store.store("b", "a/b.txt", sample_record()).await.unwrap();
        assert!(dir.path().join("b/a/.lamina-meta/b.txt.json").exists());
    }

    #[tokio::test]
    async fn list_all_keys_reconstructs_keys_from_sidecars() {
        let (_dir, store) = store();
        store.store("b", "x.txt", sample_record()).await.unwrap();
        store.store("b", "nested/y.txt", sample_record()).await.unwrap();

        let mut keys = store.list_all_keys("b").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["nested/y.txt".to_string(), "x.txt".to_string()]);
    }

    #[test]
    fn is_valid_key_rejects_inline_dir_segment() {
        let dir = tempfile::tempdir().unwrap();
        let store = InlineMetadataStore::new(dir.path(), ".lamina-tmp-", ".lamina-meta");
        assert!(!store.is_valid_key("a/.lamina-meta/b.txt"));
    }
}
