//! Archive sources: what gets archived and where the archive lands.

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::error::ArchiveError;

/// A local file or directory to be archived.
///
/// The id is the identity of the source: two sources with the same path but
/// different ids are archived independently into different destinations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveSource {
    id: u64,
    path: PathBuf,
}

impl ArchiveSource {
    /// Creates a source with a fresh random id.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_id(uuid::Uuid::new_v4().as_u64_pair().0, path)
    }

    pub fn with_id<P: Into<PathBuf>>(id: u64, path: P) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deterministic archive location for this source inside `temp_dir`.
    pub fn destination(&self, temp_dir: &Path) -> PathBuf {
        temp_dir.join(format!("tarchive-{:016x}.zip", self.id))
    }

    pub fn is_staging(&self, staging_prefix: &str) -> bool {
        self.path.is_dir()
            && self
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(staging_prefix))
                .unwrap_or(false)
    }

    /// Resolves the source into the list of paths handed to the compressor.
    ///
    /// Staging directories expand to their immediate children (sorted by
    /// name); anything else is archived as-is. An empty list is a valid
    /// result here, the worker decides what to do with it.
    pub fn resolve(&self, staging_prefix: &str) -> Result<Vec<PathBuf>, ArchiveError> {
        if !self.path.exists() {
            return Err(ArchiveError::FileNotFound(self.path.clone()));
        }

        if !self.is_staging(staging_prefix) {
            return Ok(vec![self.path.clone()]);
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| ArchiveError::Unreadable {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
            paths.push(entry.into_path());
        }

        debug!(
            "Resolved staging directory {} to {} entries",
            self.path.display(),
            paths.len()
        );
        Ok(paths)
    }
}

impl fmt::Display for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}:{}", self.id, self.path.display())
    }
}
