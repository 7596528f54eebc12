//! Core data-model entities shared across the engine.
//!
//! These types carry semantics, not storage layout — each backend is
//! free to (de)serialize them however suits its physical layout.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use crate::config::BucketType;

/// A bucket record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub created_at: String,
    #[serde(default)]
    pub bucket_type: BucketType,
    #[serde(default)]
    pub storage_class: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// Checksum values computed for an object or a single part.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checksums {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc64nvme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl Checksums {
    pub fn is_empty(&self) -> bool {
        self.crc32.is_none()
            && self.crc32c.is_none()
            && self.crc64nvme.is_none()
            && self.sha1.is_none()
            && self.sha256.is_none()
    }
}

/// Which checksum algorithm a caller has requested be validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecksumAlgorithm {
    Crc32,
    Crc32c,
    Crc64nvme,
    Sha1,
    Sha256,
}

/// A checksum value a client supplied up front, to be verified once the
/// store completes.
#[derive(Debug, Clone)]
pub struct ChecksumRequest {
    pub algorithm: ChecksumAlgorithm,
    pub expected: String,
}

/// The metadata-store-authoritative portion of an object's record.
/// Size and last-modified are always read from the data file, never
/// from this record, per the metadata-store contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadataRecord {
    pub etag: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub owner_display_name: Option<String>,
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    #[serde(default)]
    pub checksums: Checksums,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

/// A fully-resolved object record as returned to a caller: metadata
/// fields plus the size/last-modified the data store observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub last_modified: String,
    pub etag: String,
    pub content_type: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub owner_display_name: Option<String>,
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    #[serde(default)]
    pub checksums: Checksums,
}

/// In-progress multipart upload metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartUpload {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    pub initiated_at: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    #[serde(default)]
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
}

/// A single uploaded part, as returned after `store_part` or during
/// `list_parts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPart {
    pub part_number: u32,
    pub size: u64,
    pub etag: String,
    pub last_modified: String,
    #[serde(default)]
    pub checksums: Checksums,
}

/// The outcome of a successful store operation.
#[derive(Debug, Clone)]
pub struct StoreOutcome {
    pub size: u64,
    pub etag: String,
    pub checksums: Checksums,
}

/// Result of a `List` call against the object data store.
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub keys: Vec<String>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_start_after: Option<String>,
}

/// An inclusive byte range for ranged reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered by this range.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}
