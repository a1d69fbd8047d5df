//! Zip compression of resolved archive inputs.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, Timelike};
use log::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::CompressionLevel;
use crate::error::ArchiveError;

/// Everything a [`Compressor`] needs to produce one archive.
#[derive(Debug, Clone)]
pub struct CompressRequest {
    pub inputs: Vec<PathBuf>,
    pub destination: PathBuf,
    pub level: CompressionLevel,
    pub size_limit: u64,
    pub chunk_size: usize,
}

pub trait Compressor: Send + Sync {
    /// Writes `request.inputs` into a single archive at `request.destination`.
    ///
    /// `progress` receives fractions in `[0, 1]`. `cancelled` is polled
    /// between files and between chunks; once it returns true the call
    /// must stop and return [`ArchiveError::Cancelled`].
    fn compress(
        &self,
        request: &CompressRequest,
        progress: &mut dyn FnMut(f64),
        cancelled: &dyn Fn() -> bool,
    ) -> Result<PathBuf, ArchiveError>;
}

/// A file to be stored in the archive and the name it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub name: String,
}

/// Expands the inputs into archive entries.
///
/// Regular files keep their file name; directories are walked recursively
/// and their files are named relative to the directory's parent, so the
/// directory name is preserved inside the archive.
pub fn collect_entries(inputs: &[PathBuf]) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut entries = Vec::new();

    for input in inputs {
        if !input.exists() {
            return Err(ArchiveError::FileNotFound(input.clone()));
        }

        if !input.is_dir() {
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| ArchiveError::FileNotFound(input.clone()))?;
            entries.push(ArchiveEntry {
                path: input.clone(),
                name,
            });
            continue;
        }

        let base = input.parent().unwrap_or(input);
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = entry.map_err(|e| ArchiveError::Unreadable {
                path: input.clone(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(base).unwrap_or(entry.path());
            entries.push(ArchiveEntry {
                path: entry.path().to_path_buf(),
                name: entry_name(relative),
            });
        }
    }

    Ok(entries)
}

fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Default compressor backed by the `zip` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipCompressor;

impl ZipCompressor {
    pub fn new() -> Self {
        Self
    }
}

enum WriteOutcome {
    Finished,
    Cancelled,
}

impl Compressor for ZipCompressor {
    fn compress(
        &self,
        request: &CompressRequest,
        progress: &mut dyn FnMut(f64),
        cancelled: &dyn Fn() -> bool,
    ) -> Result<PathBuf, ArchiveError> {
        let entries = collect_entries(&request.inputs)?;
        if entries.is_empty() {
            let path = request
                .inputs
                .first()
                .cloned()
                .unwrap_or_else(|| request.destination.clone());
            return Err(ArchiveError::EmptySource(path));
        }

        let mut total_size: u64 = 0;
        for entry in &entries {
            if cancelled() {
                return Err(ArchiveError::Cancelled);
            }
            let metadata =
                std::fs::metadata(&entry.path).map_err(|e| ArchiveError::io(&entry.path, e))?;
            total_size += metadata.len();
            if total_size > request.size_limit {
                return Err(ArchiveError::SizeLimit {
                    limit: request.size_limit,
                });
            }
        }

        progress(0.0);

        let destination = &request.destination;
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
        }
        // The destination is only ever replaced by a complete archive
        let partial = partial_path(destination);
        let file = File::create(&partial).map_err(|e| ArchiveError::io(&partial, e))?;

        let outcome = write_entries(file, &entries, request, total_size, progress, cancelled);

        match outcome {
            Ok(WriteOutcome::Finished) if cancelled() => {
                remove_partial(&partial);
                Err(ArchiveError::Cancelled)
            }
            Ok(WriteOutcome::Finished) => {
                if let Err(e) = std::fs::rename(&partial, destination) {
                    remove_partial(&partial);
                    return Err(ArchiveError::io(destination, e));
                }
                progress(1.0);
                debug!(
                    "Wrote {} entries ({} bytes) to {}",
                    entries.len(),
                    total_size,
                    destination.display()
                );
                Ok(destination.clone())
            }
            Ok(WriteOutcome::Cancelled) => {
                remove_partial(&partial);
                Err(ArchiveError::Cancelled)
            }
            Err(e) => {
                remove_partial(&partial);
                Err(e)
            }
        }
    }
}

fn write_entries(
    file: File,
    entries: &[ArchiveEntry],
    request: &CompressRequest,
    total_size: u64,
    progress: &mut dyn FnMut(f64),
    cancelled: &dyn Fn() -> bool,
) -> Result<WriteOutcome, ArchiveError> {
    let mut zip = ZipWriter::new(file);
    let mut buffer = vec![0u8; request.chunk_size.max(1)];
    let mut written: u64 = 0;

    for entry in entries {
        if cancelled() {
            return Ok(WriteOutcome::Cancelled);
        }

        let mut input = File::open(&entry.path).map_err(|e| ArchiveError::io(&entry.path, e))?;
        let metadata = input
            .metadata()
            .map_err(|e| ArchiveError::io(&entry.path, e))?;

        let mut options = file_options(request.level).large_file(needs_zip64(metadata.len()));
        if let Some(modified) = metadata.modified().ok().and_then(zip_datetime) {
            options = options.last_modified_time(modified);
        }

        zip.start_file(entry.name.as_str(), options)?;

        loop {
            if cancelled() {
                return Ok(WriteOutcome::Cancelled);
            }
            let read = input
                .read(&mut buffer)
                .map_err(|e| ArchiveError::io(&entry.path, e))?;
            if read == 0 {
                break;
            }
            zip.write_all(&buffer[..read])
                .map_err(|e| ArchiveError::io(&request.destination, e))?;
        }

        written += metadata.len();
        if total_size == 0 {
            progress(1.0);
        } else {
            progress(written as f64 / total_size as f64);
        }
    }

    zip.finish()?;
    Ok(WriteOutcome::Finished)
}

fn file_options(level: CompressionLevel) -> SimpleFileOptions {
    match level.deflate_level() {
        Some(0) => SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
        Some(level) => SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(level)),
        None => SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
    }
}

/// Entries at or above 4 GiB need zip64 extra fields.
fn needs_zip64(len: u64) -> bool {
    len >= u64::from(u32::MAX)
}

/// Unique sibling of `destination` that an archive is written to before
/// being renamed into place.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.part", uuid::Uuid::new_v4().simple()));
    destination.with_file_name(name)
}

fn zip_datetime(time: std::time::SystemTime) -> Option<zip::DateTime> {
    let local: chrono::DateTime<Local> = time.into();
    let year = u16::try_from(local.year()).ok()?;
    zip::DateTime::from_date_and_time(
        year,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial archive {}: {}", path.display(), e);
        }
    }
}
