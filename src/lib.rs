//! Lamina engine — the storage core of an S3-compatible object storage
//! gateway.
//!
//! This crate is deliberately silent on HTTP, SigV4 authentication, and
//! XML serialization: it is the embeddable library those layers sit on
//! top of. What it owns is everything the wire protocol ultimately
//! delegates to — object bytes, metadata sidecars, multipart staging,
//! bucket lifecycle, and the network-filesystem resilience underneath
//! all of them.

pub mod bucket;
pub mod checksum;
pub mod chunked;
pub mod config;
pub mod data;
pub mod error;
pub mod facade;
pub mod lock;
pub mod metadata;
pub mod model;
pub mod multipart;
pub mod netfs;
pub mod path;

use crate::bucket::{BucketStore, LocalBucketStore};
use crate::config::{EngineConfig, MetadataMode};
use crate::data::{LocalObjectDataStore, ObjectDataStore};
use crate::error::{EngineError, Result};
use crate::facade::{BucketFacade, MultipartFacade, ObjectFacade};
use crate::lock::{InProcessLockManager, LockManager};
use crate::metadata::{InlineMetadataStore, ObjectMetadataStore, SeparateDirectoryMetadataStore};
use crate::multipart::{LocalMultipartUploadStore, MultipartUploadStore};
use crate::netfs::RetryPolicy;
use std::sync::Arc;

/// The assembled storage engine: one facade per external operation
/// group, sharing the same underlying data/metadata/bucket stores.
///
/// Constructed once at host startup from an [`EngineConfig`]; every
/// facade method is safe to call concurrently from many tasks.
pub struct Engine {
    pub objects: ObjectFacade,
    pub buckets: BucketFacade,
    pub multipart: MultipartFacade,
}

impl Engine {
    /// Build the engine's store graph from configuration.
    ///
    /// Fails fast if the configuration names a backend this build
    /// cannot construct: `MetadataMode::Xattr` outside Unix, or
    /// `MetadataMode::SeparateDirectory` without a configured
    /// `metadata_directory`. `MetadataMode::Database` is a contract
    /// this crate defines but does not implement; relational-metadata
    /// backends are a separate crate built against the same trait.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let retry_policy = RetryPolicy::new(config.network_mode, config.retry_count, config.retry_delay_ms);
        let locks: Arc<dyn LockManager> = Arc::new(InProcessLockManager::new());

        let data_directory = config.data_directory.clone();
        let temp_prefix = config.temp_file_prefix.clone();
        let inline_metadata_dir_name = config.inline_metadata_directory_name.clone();

        let data: Arc<dyn ObjectDataStore> = Arc::new(LocalObjectDataStore::new(
            data_directory.clone(),
            temp_prefix.clone(),
            inline_metadata_dir_name.clone(),
            retry_policy,
            locks.clone(),
        ));

        let metadata: Arc<dyn ObjectMetadataStore> = match config.metadata_mode {
            MetadataMode::SeparateDirectory => {
                let metadata_directory = config.metadata_directory.clone().ok_or_else(|| {
                    EngineError::InvalidArgument {
                        message: "metadata_directory is required when metadata_mode is SeparateDirectory"
                            .to_string(),
                    }
                })?;
                Arc::new(SeparateDirectoryMetadataStore::new(
                    metadata_directory,
                    temp_prefix.clone(),
                    inline_metadata_dir_name.clone(),
                ))
            }
            MetadataMode::Inline => Arc::new(InlineMetadataStore::new(
                data_directory.clone(),
                temp_prefix.clone(),
                inline_metadata_dir_name.clone(),
            )),
            MetadataMode::Xattr => {
                #[cfg(unix)]
                {
                    Arc::new(metadata::XattrMetadataStore::new(
                        data_directory.clone(),
                        config.xattr_prefix.clone(),
                        temp_prefix.clone(),
                        inline_metadata_dir_name.clone(),
                    ))
                }
                #[cfg(not(unix))]
                {
                    return Err(EngineError::InvalidArgument {
                        message: "MetadataMode::Xattr requires a Unix platform".to_string(),
                    });
                }
            }
            MetadataMode::Database => {
                return Err(EngineError::InvalidArgument {
                    message:
                        "MetadataMode::Database names a relational-backend contract this build does not implement"
                            .to_string(),
                });
            }
        };

        let bucket_meta_root = config
            .metadata_directory
            .as_deref()
            .map(|dir| std::path::PathBuf::from(dir).join("_buckets"))
            .unwrap_or_else(|| {
                std::path::PathBuf::from(&data_directory)
                    .join(&inline_metadata_dir_name)
                    .join("_buckets")
            });
        let buckets: Arc<dyn BucketStore> = Arc::new(LocalBucketStore::new(
            data_directory.clone(),
            bucket_meta_root,
            temp_prefix.clone(),
        ));

        let multipart_staging_root = config
            .metadata_directory
            .as_deref()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| std::path::PathBuf::from(&data_directory).join(&inline_metadata_dir_name));
        let multipart_store: Arc<dyn MultipartUploadStore> = Arc::new(LocalMultipartUploadStore::new(
            multipart_staging_root,
            temp_prefix.clone(),
            retry_policy,
            data.clone(),
        ));

        let objects = ObjectFacade::new(
            data,
            metadata,
            buckets.clone(),
            locks,
            temp_prefix.clone(),
            inline_metadata_dir_name.clone(),
        );
        let bucket_facade = BucketFacade::new(
            buckets.clone(),
            inline_metadata_dir_name.clone(),
            config.bucket_defaults.clone(),
        );
        let multipart_facade = MultipartFacade::new(
            multipart_store,
            buckets,
            temp_prefix,
            inline_metadata_dir_name,
        );

        Ok(Self {
            objects,
            buckets: bucket_facade,
            multipart: multipart_facade,
        })
    }
}

/// Install a process-wide `tracing` subscriber from [`config::LoggingConfig`].
///
/// Intended for host binaries (the bootstrap CLI, or an HTTP server
/// built on top of this crate) — the engine itself never installs a
/// subscriber implicitly.
pub fn init_tracing(logging: &config::LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}
