//! Error taxonomy for the storage engine.
//!
//! Every variant maps to one of the S3 error codes named in the wire
//! contract. The engine never formats XML itself — that belongs to the
//! (out of scope) HTTP layer — but every error carries the same `code`
//! an HTTP layer would need to render one.

use thiserror::Error;

/// Errors raised by the storage engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The specified bucket does not exist.
    #[error("the specified bucket does not exist: {bucket}")]
    NoSuchBucket { bucket: String },

    /// The specified key does not exist.
    #[error("the specified key does not exist: {key}")]
    NoSuchKey { bucket: String, key: String },

    /// The specified multipart upload does not exist.
    #[error("the specified upload does not exist: {upload_id}")]
    NoSuchUpload { upload_id: String },

    /// Bucket deletion was refused because the bucket is not empty and
    /// `force` was not set.
    #[error("the bucket you tried to delete is not empty: {bucket}")]
    BucketNotEmpty { bucket: String },

    /// A bucket with this name already exists.
    #[error("the requested bucket name is not available: {bucket}")]
    BucketAlreadyExists { bucket: String },

    /// The object key fails the forbidden-key policy (temp prefix,
    /// inline-metadata segment, path escape, or empty key).
    #[error("invalid object name: {reason}")]
    InvalidObjectName { reason: String },

    /// The bucket name collides with the inline-metadata directory
    /// name, or otherwise fails bucket-name validation.
    #[error("invalid bucket name: {reason}")]
    InvalidBucketName { reason: String },

    /// A byte-range request could not be satisfied.
    #[error("the requested range is not satisfiable")]
    InvalidRange,

    /// A client-supplied checksum did not match the computed value.
    #[error("the provided checksum does not match the computed value")]
    InvalidChecksum,

    /// A chunk or trailer signature failed validation.
    #[error("the request signature we calculated does not match the signature you provided")]
    SignatureDoesNotMatch,

    /// A multipart part is missing or its ETag does not match what was
    /// recorded at upload time.
    #[error("invalid part: {message}")]
    InvalidPart { message: String },

    /// Parts were not supplied in ascending part-number order at
    /// completion time.
    #[error("the list of parts was not in ascending order")]
    InvalidPartOrder,

    /// A LIST request asked for more keys than the engine allows in a
    /// single response.
    #[error("too many keys requested")]
    TooManyKeys,

    /// A request argument failed validation.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// A distributed lock could not be acquired within its timeout.
    #[error("timed out acquiring lock for {path}")]
    LockTimeout { path: String },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// An I/O error that survived the retry pipeline (or occurred
    /// outside network-filesystem mode).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// The S3 error code string an HTTP layer would render.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NoSuchBucket { .. } => "NoSuchBucket",
            EngineError::NoSuchKey { .. } => "NoSuchKey",
            EngineError::NoSuchUpload { .. } => "NoSuchUpload",
            EngineError::BucketNotEmpty { .. } => "BucketNotEmpty",
            EngineError::BucketAlreadyExists { .. } => "BucketAlreadyExists",
            EngineError::InvalidObjectName { .. } => "InvalidObjectName",
            EngineError::InvalidBucketName { .. } => "InvalidBucketName",
            EngineError::InvalidRange => "InvalidRange",
            EngineError::InvalidChecksum => "InvalidChecksum",
            EngineError::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            EngineError::InvalidPart { .. } => "InvalidPart",
            EngineError::InvalidPartOrder => "InvalidPartOrder",
            EngineError::TooManyKeys => "TooManyKeys",
            EngineError::InvalidArgument { .. } => "InvalidArgument",
            EngineError::LockTimeout { .. } => "InternalError",
            EngineError::Cancelled => "RequestTimeout",
            EngineError::Io(_) => "InternalError",
            EngineError::Internal(_) => "InternalError",
        }
    }

    /// Whether this error represents a not-found condition rather than
    /// a failure — used by callers that want the nil/false-on-not-found
    /// convention described in the design notes.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::NoSuchBucket { .. }
                | EngineError::NoSuchKey { .. }
                | EngineError::NoSuchUpload { .. }
        )
    }
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;
