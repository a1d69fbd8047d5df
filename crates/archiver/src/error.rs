use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiverError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

/// Terminal failure of an archive job.
///
/// This is the payload of [`ArchiveStatus::Fail`](crate::ArchiveStatus::Fail)
/// and is cloned to every subscriber of the source, so underlying I/O and
/// zip errors are captured as their rendered message.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ArchiveError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read '{path}': {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Nothing to archive in '{0}'")]
    EmptySource(PathBuf),

    #[error("Archive exceeds the {limit} byte limit")]
    SizeLimit { limit: u64 },

    #[error("I/O error on '{path}': {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Failed to zip files: {0}")]
    Zip(String),

    #[error("Archiving was cancelled")]
    Cancelled,

    #[error("Archiver is shutting down")]
    Shutdown,
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        ArchiveError::Zip(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ArchiverError>;
