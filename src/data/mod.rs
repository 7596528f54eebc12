//! Object data store: the filesystem contract for object bytes.
//!
//! The data store only knows about bytes, sizes, and paths. Everything
//! about ETags, user metadata, and ownership lives in the metadata
//! store (`crate::metadata`); the two are composed by the facade layer.

mod local;

pub use local::LocalObjectDataStore;

use crate::chunked::BoxedChunkValidator;
use crate::config::BucketType;
use crate::error::Result;
use crate::model::{ByteRange, ChecksumRequest, ListResult, StoreOutcome};
use std::future::Future;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

/// Information about a stored object independent of its metadata
/// sidecar: size and modification time come from the filesystem itself.
#[derive(Debug, Clone, Copy)]
pub struct ObjectInfo {
    pub size: u64,
    pub last_modified: std::time::SystemTime,
}

/// Outcome of a successful copy.
#[derive(Debug, Clone)]
pub struct CopyOutcome {
    pub size: u64,
    pub etag: String,
}

/// The object-bytes contract every backend implements.
///
/// Byte sources are taken as `AsyncRead` trait objects so callers can
/// pass anything from an in-memory cursor to a chunked-parser output
/// without the store caring which.
pub trait ObjectDataStore: Send + Sync + 'static {
    /// Stream `source` into `bucket/key`, returning size/etag/checksums.
    ///
    /// `chunk_validator`, if given, routes `source` through the
    /// `aws-chunked` decoder and is invoked once per chunk; a chunk
    /// that fails validation aborts the write and leaves no trace of
    /// the temp file. `checksum_request`, if given, is verified against
    /// the computed checksum before the write is published; a mismatch
    /// fails the store the same way.
    fn store<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        source: Pin<Box<dyn AsyncRead + Send + 'a>>,
        chunk_validator: Option<BoxedChunkValidator>,
        checksum_request: Option<ChecksumRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<StoreOutcome>> + Send + 'a>>;

    /// Concatenate `sources` in order into `bucket/key`, used by
    /// multipart completion.
    fn store_from_parts<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        sources: Vec<Pin<Box<dyn AsyncRead + Send + 'a>>>,
    ) -> Pin<Box<dyn Future<Output = Result<StoreOutcome>> + Send + 'a>>;

    /// Stream `bucket/key` (optionally a byte range) into `dest`.
    /// Returns `Ok(false)` when the object doesn't exist or the range
    /// isn't satisfiable; never returns `Ok(false)` for any other reason.
    fn read<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        dest: Pin<Box<dyn AsyncWrite + Send + 'a>>,
        range: Option<ByteRange>,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    fn exists<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    fn info<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ObjectInfo>>> + Send + 'a>>;

    fn delete<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    fn compute_etag<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>>;

    fn copy<'a>(
        &'a self,
        src_bucket: &'a str,
        src_key: &'a str,
        dst_bucket: &'a str,
        dst_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CopyOutcome>>> + Send + 'a>>;

    #[allow(clippy::too_many_arguments)]
    fn list<'a>(
        &'a self,
        bucket: &'a str,
        bucket_type: BucketType,
        prefix: &'a str,
        delimiter: Option<&'a str>,
        start_after: Option<&'a str>,
        max_keys: usize,
    ) -> Pin<Box<dyn Future<Output = Result<ListResult>> + Send + 'a>>;
}
