//! Bucket lifecycle: directory creation/deletion plus the bucket's own
//! metadata record (creation time, type, storage class, owner, tags).

mod local;

pub use local::LocalBucketStore;

use crate::error::Result;
use crate::model::Bucket;
use std::future::Future;
use std::pin::Pin;

pub trait BucketStore: Send + Sync + 'static {
    fn create<'a>(
        &'a self,
        bucket: &'a Bucket,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Overwrite the record of an already-existing bucket (e.g. after a
    /// tag update). Does not touch the bucket's data directory.
    fn replace_record<'a>(
        &'a self,
        bucket: &'a Bucket,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Delete a bucket. When `force` is `false`, deleting a non-empty
    /// bucket fails with `BucketNotEmpty`.
    fn delete<'a>(
        &'a self,
        bucket: &'a str,
        force: bool,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn exists<'a>(&'a self, bucket: &'a str) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    fn get<'a>(
        &'a self,
        bucket: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Bucket>>> + Send + 'a>>;

    fn list(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Bucket>>> + Send + '_>>;
}
