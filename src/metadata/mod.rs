//! Object metadata store: the sidecar contract for everything that
//! isn't raw bytes — ETag, content-type, user metadata, owner,
//! checksums.
//!
//! Three interchangeable backends implement [`ObjectMetadataStore`]:
//! separate-directory JSON sidecars, inline per-directory sidecars, and
//! POSIX extended attributes. Size and last-modified are never carried
//! here — they always come from the data store's filesystem view.

mod inline;
mod separate;
#[cfg(unix)]
mod xattr_backend;

pub use inline::InlineMetadataStore;
pub use separate::SeparateDirectoryMetadataStore;
#[cfg(unix)]
pub use xattr_backend::XattrMetadataStore;

use crate::error::Result;
use crate::model::ObjectMetadataRecord;
use std::future::Future;
use std::pin::Pin;

/// The metadata-sidecar contract every backend implements.
pub trait ObjectMetadataStore: Send + Sync + 'static {
    /// Persist `record` for `bucket/key`, returning it back unchanged
    /// (the store itself never derives fields from the record — the
    /// caller supplies the final object record to be written).
    fn store<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        record: ObjectMetadataRecord,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectMetadataRecord>> + Send + 'a>>;

    fn get<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ObjectMetadataRecord>>> + Send + 'a>>;

    fn delete<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn exists<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    /// List every key with metadata recorded in `bucket`. Intended for
    /// administrative rebuild/migration tooling — the data store's
    /// filesystem-walking `list` is the canonical listing for ordinary
    /// client requests.
    fn list_all_keys<'a>(
        &'a self,
        bucket: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;

    /// Whether `key` is a syntactically valid key for this backend
    /// (e.g. the xattr backend additionally rejects keys whose mapped
    /// path would collide with the attribute-name limits of the
    /// underlying filesystem).
    fn is_valid_key(&self, key: &str) -> bool;
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::model::Checksums;
    use std::collections::HashMap;

    use crate::model::ObjectMetadataRecord;

    pub fn sample_record() -> ObjectMetadataRecord {
        ObjectMetadataRecord {
            etag: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            content_type: "text/plain".to_string(),
            owner_id: Some("owner-1".to_string()),
            owner_display_name: Some("Alice".to_string()),
            user_metadata: HashMap::from([("x-custom".to_string(), "value".to_string())]),
            checksums: Checksums::default(),
        }
    }
}
