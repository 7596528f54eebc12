//! Separate-directory metadata backend: one JSON sidecar per object
//! under a metadata root that mirrors the bucket/key layout.

use super::ObjectMetadataStore;
use crate::error::{EngineError, Result};
use crate::model::ObjectMetadataRecord;
use crate::netfs;
use crate::path;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use uuid::Uuid;

pub struct SeparateDirectoryMetadataStore {
    meta_root: PathBuf,
    temp_prefix: String,
    inline_metadata_dir_name: String,
}

impl SeparateDirectoryMetadataStore {
    pub fn new(
        meta_root: impl Into<PathBuf>,
        temp_prefix: impl Into<String>,
        inline_metadata_dir_name: impl Into<String>,
    ) -> Self {
        Self {
            meta_root: meta_root.into(),
            temp_prefix: temp_prefix.into(),
            inline_metadata_dir_name: inline_metadata_dir_name.into(),
        }
    }

    fn sidecar_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let bucket_root = self.meta_root.join(bucket);
        let resolved = path::resolve_under(&bucket_root, key)?;
        let file_name = format!(
            "{}.json",
            resolved.file_name().and_then(|n| n.to_str()).unwrap_or("")
        );
        Ok(resolved.with_file_name(file_name))
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

impl ObjectMetadataStore for SeparateDirectoryMetadataStore {
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
            if let Some(parent) = path.parent() {
                let bucket_root = self.meta_root.join(bucket);
                netfs::delete_directory_if_empty(parent, &bucket_root).await?;
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
            let bucket_root = self.meta_root.join(bucket);
            let mut keys = Vec::new();
            walk_json_files(&bucket_root, &bucket_root, &mut keys).await?;
            Ok(keys)
        })
    }

    fn is_valid_key(&self, key: &str) -> bool {
        path::validate_key(key, &self.temp_prefix, &self.inline_metadata_dir_name).is_ok()
    }
}

fn walk_json_files<'a>(
    dir: &'a std::path::Path,
    bucket_root: &'a std::path::Path,
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
            if file_type.is_dir() {
                walk_json_files(&path, bucket_root, out).await?;
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                let relative = path
                    .strip_prefix(bucket_root)
                    .unwrap_or(&path)
                    .with_extension("")
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");
                out.push(relative);
            }
        }
        Ok(())
    })
}
