//! Key validation and path resolution shared by the data and metadata
//! stores.
//!
//! Every store keyed by a user-supplied object key funnels through
//! [`validate_key`] before touching the filesystem; this is the single
//! place the forbidden-key policy (§4.5) is enforced.

use crate::error::{EngineError, Result};
use std::path::{Component, Path, PathBuf};

/// Directory name reserved for multipart-upload staging, a sibling of
/// the inline-metadata directory in the forbidden-name policy.
pub const MULTIPART_STAGING_DIR_NAME: &str = "_multipart_uploads";

/// Validate a bucket name.
///
/// Bucket names equal to the inline-metadata directory name or the
/// multipart staging directory name are forbidden (data-model invariant
/// 7).
pub fn validate_bucket_name(name: &str, inline_metadata_dir_name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(EngineError::InvalidBucketName {
            reason: "bucket name must not be empty".to_string(),
        });
    }
    if name.len() < 3 || name.len() > 63 {
        return Err(EngineError::InvalidBucketName {
            reason: "bucket name must be 3-63 characters".to_string(),
        });
    }
    if name == inline_metadata_dir_name {
        return Err(EngineError::InvalidBucketName {
            reason: format!(
                "bucket name must not equal the reserved metadata directory name {name:?}"
            ),
        });
    }
    if name == MULTIPART_STAGING_DIR_NAME {
        return Err(EngineError::InvalidBucketName {
            reason: format!(
                "bucket name must not equal the reserved multipart staging directory name {name:?}"
            ),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(EngineError::InvalidBucketName {
            reason: "bucket name contains invalid characters".to_string(),
        });
    }
    Ok(())
}

/// Validate an object key against the forbidden-key policy.
///
/// A key is rejected if it is empty, starts with the temp-file prefix,
/// contains a path segment equal to the inline-metadata directory name
/// or the multipart staging directory name, or contains a `..`
/// path-escape segment.
pub fn validate_key(key: &str, temp_prefix: &str, inline_metadata_dir_name: &str) -> Result<()> {
    if key.is_empty() {
        return Err(EngineError::InvalidObjectName {
            reason: "key must not be empty".to_string(),
        });
    }
    let first_segment = key.split('/').next().unwrap_or(key);
    if first_segment.starts_with(temp_prefix) {
        return Err(EngineError::InvalidObjectName {
            reason: format!("key must not start with the reserved temp prefix {temp_prefix:?}"),
        });
    }
    for segment in key.split('/') {
        if segment == inline_metadata_dir_name {
            return Err(EngineError::InvalidObjectName {
                reason: format!(
                    "key must not contain a path segment equal to {inline_metadata_dir_name:?}"
                ),
            });
        }
        if segment == MULTIPART_STAGING_DIR_NAME {
            return Err(EngineError::InvalidObjectName {
                reason: format!(
                    "key must not contain a path segment equal to the reserved multipart staging directory name {MULTIPART_STAGING_DIR_NAME:?}"
                ),
            });
        }
        if segment == ".." {
            return Err(EngineError::InvalidObjectName {
                reason: "key must not contain a path-escape segment".to_string(),
            });
        }
    }
    Ok(())
}

/// Resolve a bucket-relative key to an absolute filesystem path rooted
/// at `root`, guarding against path traversal.
///
/// Mirrors the teacher's `LocalBackend::resolve`: component-wise
/// rejection of `..` segments (cheap, works for paths that don't yet
/// exist), plus a canonicalize-and-prefix check for paths that do.
pub fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf> {
    for component in Path::new(relative).components() {
        if matches!(component, Component::ParentDir) {
            return Err(EngineError::InvalidObjectName {
                reason: format!("path traversal detected in key: {relative}"),
            });
        }
    }
    let candidate = root.join(relative);
    if candidate.exists() {
        let canonical_root = root
            .canonicalize()
            .map_err(|e| EngineError::Internal(e.into()))?;
        let canonical_candidate = candidate
            .canonicalize()
            .map_err(|e| EngineError::Internal(e.into()))?;
        if !canonical_candidate.starts_with(&canonical_root) {
            return Err(EngineError::InvalidObjectName {
                reason: format!("path traversal detected in key: {relative}"),
            });
        }
    }
    Ok(candidate)
}

/// Map a key's `/` separators onto the OS separator and join under
/// `root`, without the traversal guard (used for keys already validated
/// by [`validate_key`]).
pub fn key_path(root: &Path, key: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in key.split('/') {
        path.push(segment);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_temp_prefixed_key() {
        let err = validate_key(".lamina-tmp-abc", ".lamina-tmp-", ".lamina-meta").unwrap_err();
        assert_eq!(err.code(), "InvalidObjectName");
    }

    #[test]
    fn rejects_inline_meta_segment() {
        let err = validate_key("a/.lamina-meta/x", ".lamina-tmp-", ".lamina-meta").unwrap_err();
        assert_eq!(err.code(), "InvalidObjectName");
    }

    #[test]
    fn rejects_empty_key() {
        assert!(validate_key("", ".lamina-tmp-", ".lamina-meta").is_err());
    }

    #[test]
    fn rejects_path_escape() {
        assert!(validate_key("a/../b", ".lamina-tmp-", ".lamina-meta").is_err());
    }

    #[test]
    fn rejects_multipart_staging_segment() {
        let err = validate_key("_multipart_uploads", ".lamina-tmp-", ".lamina-meta").unwrap_err();
        assert_eq!(err.code(), "InvalidObjectName");
        let err = validate_key("a/_multipart_uploads/b", ".lamina-tmp-", ".lamina-meta").unwrap_err();
        assert_eq!(err.code(), "InvalidObjectName");
    }

    #[test]
    fn bucket_name_equal_to_multipart_staging_dir_rejected() {
        assert!(validate_bucket_name("_multipart_uploads", ".lamina-meta").is_err());
    }

    #[test]
    fn accepts_normal_key() {
        assert!(validate_key("a/b/c.txt", ".lamina-tmp-", ".lamina-meta").is_ok());
    }

    #[test]
    fn bucket_name_equal_to_meta_dir_rejected() {
        assert!(validate_bucket_name(".lamina-meta", ".lamina-meta").is_err());
    }

    #[test]
    fn resolve_under_rejects_dotdot() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_under(dir.path(), "a/../../etc/passwd").is_err());
    }

    #[test]
    fn resolve_under_accepts_nested_key() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_under(dir.path(), "a/b/c.txt").unwrap();
        assert_eq!(resolved, dir.path().join("a/b/c.txt"));
    }
}
