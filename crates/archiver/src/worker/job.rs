use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::source::ArchiveSource;
use crate::status::ArchiveStatus;

/// One archive run for one source, as handed to the worker pool.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    pub id: u64,
    pub source: ArchiveSource,
    pub destination: PathBuf,
    cancel: Arc<AtomicBool>,
}

impl ArchiveJob {
    pub fn new(id: u64, source: ArchiveSource, destination: PathBuf) -> Self {
        Self {
            id,
            source,
            destination,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests cooperative cancellation. Clones of the job share the flag.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

/// A status produced by a worker for a specific job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub job_id: u64,
    pub source: ArchiveSource,
    pub status: ArchiveStatus,
}

impl JobUpdate {
    pub fn new(job: &ArchiveJob, status: ArchiveStatus) -> Self {
        Self {
            job_id: job.id,
            source: job.source.clone(),
            status,
        }
    }
}
