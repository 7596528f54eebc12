//! Multipart upload subsystem: initiate, store-part, list-parts,
//! complete, abort.
//!
//! Parts are staged in their own directory tree, independent of the
//! final object's location, so a part can be re-uploaded or an upload
//! abandoned without ever touching a published object.

mod local;

pub use local::LocalMultipartUploadStore;

use crate::chunked::BoxedChunkValidator;
use crate::error::Result;
use crate::model::{ChecksumAlgorithm, MultipartUpload, StoreOutcome, UploadPart};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// One entry of the caller-supplied ordered part list passed to
/// [`MultipartUploadStore::complete`].
#[derive(Debug, Clone)]
pub struct CompletedPart {
    pub part_number: u32,
    pub expected_etag: String,
}

pub trait MultipartUploadStore: Send + Sync + 'static {
    #[allow(clippy::too_many_arguments)]
    fn initiate<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        content_type: String,
        user_metadata: HashMap<String, String>,
        checksum_algorithm: Option<ChecksumAlgorithm>,
    ) -> Pin<Box<dyn Future<Output = Result<MultipartUpload>> + Send + 'a>>;

    /// Stage part `part_number` of `upload_id`.
    ///
    /// When `chunk_validator` is given, `source` is decoded as an
    /// `aws-chunked` stream and every chunk is validated before its
    /// payload is staged, the same way [`ObjectDataStore::store`] does
    /// for a direct `PutObject`.
    ///
    /// [`ObjectDataStore::store`]: crate::data::ObjectDataStore::store
    fn store_part<'a>(
        &'a self,
        upload_id: &'a str,
        part_number: u32,
        source: Pin<Box<dyn AsyncRead + Send + 'a>>,
        chunk_validator: Option<BoxedChunkValidator>,
    ) -> Pin<Box<dyn Future<Output = Result<UploadPart>> + Send + 'a>>;

    fn list_parts<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UploadPart>>> + Send + 'a>>;

    fn complete<'a>(
        &'a self,
        upload_id: &'a str,
        parts: Vec<CompletedPart>,
    ) -> Pin<Box<dyn Future<Output = Result<StoreOutcome>> + Send + 'a>>;

    fn abort<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
