use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiverConfig {
    #[serde(default = "default_version")]
    pub version: String,
    /// Directory the `tarchive-<id>.zip` files are written to.
    #[serde(default = "default_temp_directory")]
    pub temp_directory: PathBuf,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Directories whose name starts with this prefix are staging areas:
    /// their immediate children are archived instead of the directory itself.
    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,
    #[serde(default = "default_size_limit")]
    pub size_limit_bytes: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub compression: CompressionLevel,
    /// Capacity of the activity feed broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_temp_directory() -> PathBuf {
    std::env::temp_dir()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_staging_prefix() -> String {
    "tarchive-staging-".to_string()
}

fn default_size_limit() -> u64 {
    1500 * 1024 * 1024
}

fn default_chunk_size() -> usize {
    16 * 1024
}

fn default_event_capacity() -> usize {
    100
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            temp_directory: default_temp_directory(),
            worker_count: default_worker_count(),
            staging_prefix: default_staging_prefix(),
            size_limit_bytes: default_size_limit(),
            chunk_size: default_chunk_size(),
            compression: CompressionLevel::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl ArchiverConfig {
    /// Default configuration writing archives under `temp_directory`.
    pub fn with_temp_directory<P: Into<PathBuf>>(temp_directory: P) -> Self {
        Self {
            temp_directory: temp_directory.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    None,
    Fastest,
    #[default]
    Default,
    Best,
}

impl CompressionLevel {
    /// Deflate level handed to the zip writer; `None` means the library default.
    pub fn deflate_level(self) -> Option<i64> {
        match self {
            CompressionLevel::None => Some(0),
            CompressionLevel::Fastest => Some(1),
            CompressionLevel::Default => None,
            CompressionLevel::Best => Some(9),
        }
    }
}
