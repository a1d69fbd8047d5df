use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::compress::{collect_entries, CompressRequest, Compressor};
use crate::config::ArchiverConfig;
use crate::error::{ArchiveError, WorkerError};
use crate::status::ArchiveStatus;
use crate::worker::job::{ArchiveJob, JobUpdate};
use crate::worker::progress::ProgressReporter;

pub struct WorkerPool {
    job_sender: Option<Sender<ArchiveJob>>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `config.worker_count` archive workers.
    ///
    /// The job queue is unbounded: `submit` is called from the coordinator
    /// thread and must never block it.
    pub fn new(
        config: Arc<ArchiverConfig>,
        compressor: Arc<dyn Compressor>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self, WorkerError> {
        let worker_count = config.worker_count.max(1);
        let (job_sender, job_receiver) = unbounded::<ArchiveJob>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_config = Arc::clone(&config);
            let worker_compressor = Arc::clone(&compressor);
            let worker_reporter = Arc::clone(&reporter);

            let handle = thread::Builder::new()
                .name(format!("archiver-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        job_rx,
                        shutdown_flag,
                        worker_config,
                        worker_compressor,
                        worker_reporter,
                    );
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} archive workers", worker_count);

        Ok(Self {
            job_sender: Some(job_sender),
            workers,
            shutdown,
        })
    }

    pub fn submit(&self, job: ArchiveJob) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        match &self.job_sender {
            Some(sender) => sender.send(job).map_err(|_| WorkerError::ChannelClosed),
            None => Err(WorkerError::ChannelClosed),
        }
    }

    pub fn shutdown(&self) {
        info!("Shutting down archive workers...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(mut self) {
        self.join_workers();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn join_workers(&mut self) {
        // Drop sender to signal workers to exit
        self.job_sender.take();

        for (i, worker) in self.workers.drain(..).enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
            self.join_workers();
            info!("All archive workers have stopped");
        }
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<ArchiveJob>,
    shutdown: Arc<AtomicBool>,
    config: Arc<ArchiverConfig>,
    compressor: Arc<dyn Compressor>,
    reporter: Arc<dyn ProgressReporter>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(job) => {
                debug!("Worker {} archiving {}", worker_id, job.source);
                run_job(&job, &config, compressor.as_ref(), reporter.as_ref());
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Runs one job to a terminal status, reporting everything through `reporter`.
pub fn run_job(
    job: &ArchiveJob,
    config: &ArchiverConfig,
    compressor: &dyn Compressor,
    reporter: &dyn ProgressReporter,
) {
    let span = tracing::info_span!("archive_job", job_id = job.id, source = %job.source);
    let _guard = span.enter();

    let report = |status: ArchiveStatus| reporter.report(JobUpdate::new(job, status));

    if job.is_cancelled() {
        report(ArchiveStatus::Fail(ArchiveError::Cancelled));
        return;
    }

    let inputs = match job.source.resolve(&config.staging_prefix) {
        Ok(inputs) => inputs,
        Err(e) => {
            error!("Failed to resolve {}: {}", job.source, e);
            report(ArchiveStatus::Fail(e));
            return;
        }
    };

    // Folders count as empty unless they hold at least one file somewhere
    match collect_entries(&inputs) {
        Ok(entries) if entries.is_empty() => {
            report(ArchiveStatus::Fail(ArchiveError::EmptySource(
                job.source.path().to_path_buf(),
            )));
            return;
        }
        Ok(_) => {}
        Err(e) => {
            error!("Failed to list {}: {}", job.source, e);
            report(ArchiveStatus::Fail(e));
            return;
        }
    }

    let request = CompressRequest {
        inputs,
        destination: job.destination.clone(),
        level: config.compression,
        size_limit: config.size_limit_bytes,
        chunk_size: config.chunk_size,
    };

    let result = compressor.compress(
        &request,
        &mut |fraction| report(ArchiveStatus::progress(fraction)),
        &|| job.is_cancelled(),
    );

    match result {
        Ok(path) => {
            info!("Archived {} to {}", job.source, path.display());
            report(ArchiveStatus::Done(path));
        }
        Err(e) => {
            if e != ArchiveError::Cancelled {
                error!("Archiving {} failed: {}", job.source, e);
            }
            report(ArchiveStatus::Fail(e));
        }
    }
}
