//! Extended-attribute metadata backend (Linux/macOS only).
//!
//! Attributes are written directly on the object's data file, so this
//! backend has no sidecar files of its own — only an attribute
//! namespace prefix to avoid colliding with attributes other tools set.

use super::ObjectMetadataStore;
use crate::error::{EngineError, Result};
use crate::model::{Checksums, ObjectMetadataRecord};
use crate::path;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Extended attributes are commonly capped well below this by the
/// filesystem (ext4: 4 KiB total); this is the spec's documented
/// per-attribute truncation point, enforced regardless of the
/// underlying filesystem's own limit.
const MAX_ATTRIBUTE_BYTES: usize = 64 * 1024;

pub struct XattrMetadataStore {
    data_root: PathBuf,
    prefix: String,
    temp_prefix: String,
    inline_metadata_dir_name: String,
}

impl XattrMetadataStore {
    pub fn new(
        data_root: impl Into<PathBuf>,
        prefix: impl Into<String>,
        temp_prefix: impl Into<String>,
        inline_metadata_dir_name: impl Into<String>,
    ) -> Self {
        Self {
            data_root: data_root.into(),
            prefix: prefix.into(),
            temp_prefix: temp_prefix.into(),
            inline_metadata_dir_name: inline_metadata_dir_name.into(),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        path::resolve_under(&self.data_root.join(bucket), key)
    }

    fn attr_name(&self, suffix: &str) -> String {
        format!("{}.{}", self.prefix, suffix)
    }

    fn set_attr(path: &Path, name: &str, value: &str) -> std::io::Result<()> {
        let mut bytes = value.as_bytes();
        if bytes.len() > MAX_ATTRIBUTE_BYTES {
            bytes = &bytes[..MAX_ATTRIBUTE_BYTES];
        }
        xattr::set(path, name, bytes)
    }

    fn get_attr(path: &Path, name: &str) -> std::io::Result<Option<String>> {
        match xattr::get(path, name)? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    fn write_all_attrs(&self, path: &Path, record: &ObjectMetadataRecord) -> Result<()> {
        Self::set_attr(path, &self.attr_name("etag"), &record.etag).map_err(EngineError::Io)?;
        Self::set_attr(path, &self.attr_name("content-type"), &record.content_type)
            .map_err(EngineError::Io)?;
        if let Some(owner_id) = &record.owner_id {
            Self::set_attr(path, &self.attr_name("owner-id"), owner_id).map_err(EngineError::Io)?;
        }
        if let Some(name) = &record.owner_display_name {
            Self::set_attr(path, &self.attr_name("owner-display-name"), name)
                .map_err(EngineError::Io)?;
        }
        for (k, v) in &record.user_metadata {
            Self::set_attr(path, &self.attr_name(&format!("metadata.{k}")), v)
                .map_err(EngineError::Io)?;
        }
        if !record.checksums.is_empty() {
            let checksums_json =
                serde_json::to_string(&record.checksums).map_err(|e| EngineError::Internal(e.into()))?;
            Self::set_attr(path, &self.attr_name("checksums"), &checksums_json)
                .map_err(EngineError::Io)?;
        }
        Ok(())
    }

    fn read_all_attrs(&self, path: &Path) -> Result<Option<ObjectMetadataRecord>> {
        let etag = match Self::get_attr(path, &self.attr_name("etag")).map_err(EngineError::Io)? {
            Some(v) => v,
            None => return Ok(None),
        };
        let content_type = Self::get_attr(path, &self.attr_name("content-type"))
            .map_err(EngineError::Io)?
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let owner_id = Self::get_attr(path, &self.attr_name("owner-id")).map_err(EngineError::Io)?;
        let owner_display_name =
            Self::get_attr(path, &self.attr_name("owner-display-name")).map_err(EngineError::Io)?;

        let mut user_metadata = HashMap::new();
        let metadata_prefix = self.attr_name("metadata.");
        if let Ok(names) = xattr::list(path) {
            for name in names {
                let name = name.to_string_lossy().into_owned();
                if let Some(key) = name.strip_prefix(&metadata_prefix) {
                    if let Some(value) = Self::get_attr(path, &name).map_err(EngineError::Io)? {
                        user_metadata.insert(key.to_string(), value);
                    }
                }
            }
        }

        let checksums = match Self::get_attr(path, &self.attr_name("checksums"))
            .map_err(EngineError::Io)?
        {
            Some(json) => serde_json::from_str(&json).unwrap_or_default(),
            None => Checksums::default(),
        };

        Ok(Some(ObjectMetadataRecord {
            etag,
            content_type,
            owner_id,
            owner_display_name,
            user_metadata,
            checksums,
        }))
    }

    fn remove_all_attrs(&self, path: &Path) -> Result<()> {
        let names: Vec<String> = match xattr::list(path) {
            Ok(names) => names.map(|n| n.to_string_lossy().into_owned()).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(EngineError::Io(e)),
        };
        for name in names {
            if name.starts_with(&format!("{}.", self.prefix)) {
                match xattr::remove(path, &name) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(EngineError::Io(e)),
                }
            }
        }
        Ok(())
    }
}

impl ObjectMetadataStore for XattrMetadataStore {
    fn store<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        record: ObjectMetadataRecord,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectMetadataRecord>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.object_path(bucket, key)?;
            self.write_all_attrs(&path, &record)?;
            Ok(record)
        })
    }

    fn get<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ObjectMetadataRecord>>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.object_path(bucket, key)?;
            self.read_all_attrs(&path)
        })
    }

    fn delete<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.object_path(bucket, key)?;
            self.remove_all_attrs(&path)
        })
    }

    fn exists<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.object_path(bucket, key)?;
            Ok(Self::get_attr(&path, &self.attr_name("etag"))
                .map_err(EngineError::Io)?
                .is_some())
        })
    }

    fn list_all_keys<'a>(
        &'a self,
        bucket: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(async move {
            let bucket_root = self.data_root.join(bucket);
            let mut keys = Vec::new();
            self.walk(&bucket_root, &bucket_root, &mut keys)?;
            Ok(keys)
        })
    }

    fn is_valid_key(&self, key: &str) -> bool {
        path::validate_key(key, &self.temp_prefix, &self.inline_metadata_dir_name).is_ok()
    }
}

impl XattrMetadataStore {
    fn walk(&self, dir: &Path, bucket_root: &Path, out: &mut Vec<String>) -> Result<()> {
        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(EngineError::Io(e)),
        };
        for entry in read_dir {
            let entry = entry.map_err(EngineError::Io)?;
            let path = entry.path();
            if path.is_dir() {
                self.walk(&path, bucket_root, out)?;
            } else if Self::get_attr(&path, &self.attr_name("etag"))
                .map_err(EngineError::Io)?
                .is_some()
            {
                let relative = path
                    .strip_prefix(bucket_root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");
                out.push(relative);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::test_support::sample_record;

    fn store() -> (tempfile::TempDir, XattrMetadataStore) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            XattrMetadataStore::new(dir.path(), "user.lamina", ".lamina-tmp-", ".lamina-meta");
        (dir, store)
    }

    #[tokio::test]
    async fn store_then_get_roundtrips() {
        let (dir, store) = store();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        let object_path = dir.path().join("b/a.txt");
        std::fs::write(&object_path, b"data").unwrap();

        let record = sample_record();
        store.store("b", "a.txt", record.clone()).await.unwrap();

        let fetched = store.get("b", "a.txt").await.unwrap().unwrap();
        assert_eq!(fetched.etag, record.etag);
        assert_eq!(fetched.user_metadata, record.user_metadata);
    }

    #[tokio::test]
    async fn get_without_data_file_returns_none() {
        let (_dir, store) = store();
        assert!(store.get("b", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_attributes_but_not_the_file() {
        let (dir, store) = store();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        let object_path = dir.path().join("b/a.txt");
        std::fs::write(&object_path, b"data").unwrap();
        store.store("b", "a.txt", sample_record()).await.unwrap();

        store.delete("b", "a.txt").await.unwrap();
        assert!(object_path.exists());
        assert!(store.get("b", "a.txt").await.unwrap().is_none());
    }
}
