//! Configuration loading and types for the storage engine.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`EngineConfig`] struct. Each field mirrors one of the recognized
//! configuration options of the wire contract.

use serde::Deserialize;
use std::path::Path;

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Root directory under which object bytes are stored.
    pub data_directory: String,

    /// Root directory for sidecar metadata files. Required when
    /// `metadata_mode` is `SeparateDirectory`.
    #[serde(default)]
    pub metadata_directory: Option<String>,

    /// Which object-metadata backend to construct.
    #[serde(default)]
    pub metadata_mode: MetadataMode,

    /// Reserved directory name for inline metadata sidecars.
    #[serde(default = "default_inline_metadata_directory_name")]
    pub inline_metadata_directory_name: String,

    /// Filename prefix for in-flight temp files.
    #[serde(default = "default_temp_file_prefix")]
    pub temp_file_prefix: String,

    /// Extended-attribute namespace prefix (xattr mode only).
    #[serde(default = "default_xattr_prefix")]
    pub xattr_prefix: String,

    /// Network-filesystem failure-mode classification.
    #[serde(default)]
    pub network_mode: NetworkMode,

    /// Number of retries beyond the first attempt (network-FS modes).
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base delay between retries, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// In-memory metadata cache settings.
    #[serde(default)]
    pub metadata_cache: MetadataCacheConfig,

    /// Defaults applied to newly created buckets.
    #[serde(default)]
    pub bucket_defaults: BucketDefaultsConfig,

    /// Maximum object/part size in bytes (quota enforcement, §1 Non-goals).
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Object-metadata backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum MetadataMode {
    #[default]
    SeparateDirectory,
    Inline,
    Xattr,
    Database,
}

/// Network-filesystem failure-mode classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkMode {
    #[default]
    None,
    Cifs,
    Nfs,
}

/// In-memory metadata cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataCacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_size_limit")]
    pub size_limit: u64,
    #[serde(default)]
    pub absolute_expiration_minutes: Option<u64>,
    #[serde(default)]
    pub sliding_expiration_minutes: Option<u64>,
}

impl Default for MetadataCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size_limit: default_cache_size_limit(),
            absolute_expiration_minutes: None,
            sliding_expiration_minutes: None,
        }
    }
}

/// Bucket type, selecting ordered vs. unordered listing semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum BucketType {
    #[default]
    GeneralPurpose,
    Directory,
}

/// Defaults applied to newly created buckets.
#[derive(Debug, Clone, Deserialize)]
pub struct BucketDefaultsConfig {
    #[serde(default)]
    pub r#type: BucketType,
    #[serde(default = "default_storage_class")]
    pub storage_class: String,
}

impl Default for BucketDefaultsConfig {
    fn default() -> Self {
        Self {
            r#type: BucketType::default(),
            storage_class: default_storage_class(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_inline_metadata_directory_name() -> String {
    ".lamina-meta".to_string()
}

fn default_temp_file_prefix() -> String {
    ".lamina-tmp-".to_string()
}

fn default_xattr_prefix() -> String {
    "user.lamina".to_string()
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_cache_size_limit() -> u64 {
    100 * 1024 * 1024 // 100 MiB
}

fn default_storage_class() -> String {
    "STANDARD".to_string()
}

fn default_max_object_size() -> u64 {
    5_368_709_120 // 5 GiB
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse engine configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<EngineConfig> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: EngineConfig = serde_yaml::from_str(&contents)?;
    Ok(config)
}
