//! The archive coordinator: one job per source, statuses fanned out to every
//! subscriber of that source.
//!
//! All bookkeeping (hubs, jobs, cached statuses) is owned by a single
//! coordinator thread. Public methods only enqueue commands, and workers
//! send their statuses back over a second channel, so every mutation runs
//! on that one thread in arrival order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use tokio::sync::broadcast;

use crate::broadcast::{ArchiveEvent, ArchiveEventBroadcaster};
use crate::compress::{Compressor, ZipCompressor};
use crate::config::{validate_config, ArchiverConfig};
use crate::error::{ArchiveError, ArchiverError, WorkerError};
use crate::hub::{StatusCallback, StatusHub, SubscriberToken};
use crate::source::ArchiveSource;
use crate::status::ArchiveStatus;
use crate::stream::{StatusStream, Subscription};
use crate::worker::{ArchiveJob, ChannelProgress, JobUpdate, WorkerPool};

pub(crate) enum Command {
    Subscribe {
        source: ArchiveSource,
        token: SubscriberToken,
        start_if_needed: bool,
        callback: StatusCallback,
    },
    Unsubscribe {
        source: ArchiveSource,
        token: SubscriberToken,
    },
    CancelAndRemove {
        source: ArchiveSource,
    },
    Stats {
        reply: Sender<CoordinatorStats>,
    },
    Shutdown,
}

/// Point-in-time counters of a coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub jobs_started: u64,
    pub jobs_finished: u64,
    pub active_sources: usize,
    pub subscribers: usize,
}

pub struct ArchiveCoordinator {
    commands: Sender<Command>,
    events: ArchiveEventBroadcaster,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl ArchiveCoordinator {
    /// Starts a coordinator that archives with [`ZipCompressor`].
    pub fn new(config: ArchiverConfig) -> Result<Self, ArchiverError> {
        Self::with_compressor(config, Arc::new(ZipCompressor::new()))
    }

    pub fn with_compressor(
        config: ArchiverConfig,
        compressor: Arc<dyn Compressor>,
    ) -> Result<Self, ArchiverError> {
        validate_config(&config)?;
        let config = Arc::new(config);

        let (command_tx, command_rx) = unbounded::<Command>();
        let (update_tx, update_rx) = unbounded::<JobUpdate>();
        let events = ArchiveEventBroadcaster::new(config.event_capacity);

        let pool = WorkerPool::new(
            Arc::clone(&config),
            compressor,
            Arc::new(ChannelProgress::new(update_tx)),
        )?;

        let state = CoordinatorState {
            config,
            entries: HashMap::new(),
            draining: HashMap::new(),
            pool: Some(pool),
            events: events.clone(),
            next_job_id: 1,
            jobs_started: 0,
            jobs_finished: 0,
        };

        let handle = thread::Builder::new()
            .name("archiver-coordinator".into())
            .spawn(move || run_coordinator(state, command_rx, update_rx))
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
        let thread_id = handle.thread().id();

        info!("Archive coordinator started");

        Ok(Self {
            commands: command_tx,
            events,
            thread: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    /// Subscribes to the statuses of `source`, starting a job if none exists
    /// and `start_if_needed` is set.
    ///
    /// Returns immediately; the first status (the cached one, or `Waiting`
    /// for a freshly started job) arrives asynchronously.
    pub fn subscribe(&self, source: ArchiveSource, start_if_needed: bool) -> StatusStream {
        let (tx, rx) = unbounded::<ArchiveStatus>();
        let callback: StatusCallback = Arc::new(move |status: &ArchiveStatus| {
            let _ = tx.send(status.clone());
        });
        let subscription = self.subscribe_with(source, start_if_needed, callback);
        StatusStream::new(subscription, rx)
    }

    /// Callback flavour of [`subscribe`](Self::subscribe).
    ///
    /// `callback` runs on the coordinator thread and must not block on the
    /// coordinator (e.g. by calling [`stats`](Self::stats)).
    pub fn subscribe_with(
        &self,
        source: ArchiveSource,
        start_if_needed: bool,
        callback: StatusCallback,
    ) -> Subscription {
        let token = SubscriberToken::next();

        let sent = self.commands.send(Command::Subscribe {
            source: source.clone(),
            token,
            start_if_needed,
            callback,
        });
        if sent.is_err() {
            debug!("Subscribe to {} after shutdown", source);
        }

        Subscription::new(source, token, self.commands.clone())
    }

    /// Cancels the job for `source` (if any) and forgets everything about it.
    ///
    /// Subscribers of an unfinished job receive `Fail(Cancelled)`; all
    /// streams of the source end afterwards.
    pub fn cancel_and_remove(&self, source: &ArchiveSource) {
        let _ = self.commands.send(Command::CancelAndRemove {
            source: source.clone(),
        });
    }

    /// Activity feed of every status transition.
    pub fn events(&self) -> broadcast::Receiver<ArchiveEvent> {
        self.events.subscribe()
    }

    /// Counters as seen by the coordinator thread once all previously
    /// enqueued commands have been processed.
    pub fn stats(&self) -> CoordinatorStats {
        if thread::current().id() == self.thread_id {
            warn!("stats() called from the coordinator thread");
            return CoordinatorStats::default();
        }

        let (reply, response) = crossbeam_channel::bounded(1);
        if self.commands.send(Command::Stats { reply }).is_err() {
            return CoordinatorStats::default();
        }
        response.recv().unwrap_or_default()
    }

    /// Cancels every job, clears all registries and stops the threads.
    pub fn shutdown(&self) {
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        let _ = self.commands.send(Command::Shutdown);

        if handle.thread().id() == thread::current().id() {
            // Called from a subscriber callback; the loop exits on its own.
            return;
        }
        if handle.join().is_err() {
            error!("Archive coordinator thread panicked");
        }
        info!("Archive coordinator stopped");
    }
}

impl Drop for ArchiveCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct SourceEntry {
    hub: StatusHub,
    job: Option<ArchiveJob>,
    /// The job is recorded but not yet handed to the pool.
    deferred: bool,
}

impl SourceEntry {
    fn new() -> Self {
        Self {
            hub: StatusHub::new(),
            job: None,
            deferred: false,
        }
    }

    fn job_in_flight(&self) -> bool {
        self.job.is_some() && !self.hub.status().is_terminal()
    }

    fn is_evictable(&self) -> bool {
        self.hub.is_empty() && !self.job_in_flight()
    }
}

struct CoordinatorState {
    config: Arc<ArchiverConfig>,
    entries: HashMap<ArchiveSource, SourceEntry>,
    /// Cancelled jobs still running on a worker, by source. A new job for
    /// the source is deferred until the old one reports its terminal status.
    draining: HashMap<ArchiveSource, u64>,
    pool: Option<WorkerPool>,
    events: ArchiveEventBroadcaster,
    next_job_id: u64,
    jobs_started: u64,
    jobs_finished: u64,
}

fn run_coordinator(
    mut state: CoordinatorState,
    commands: Receiver<Command>,
    updates: Receiver<JobUpdate>,
) {
    debug!("Coordinator loop started");

    loop {
        select! {
            recv(commands) -> command => match command {
                Ok(Command::Shutdown) | Err(_) => break,
                Ok(command) => state.handle_command(command),
            },
            recv(updates) -> update => {
                if let Ok(update) = update {
                    state.handle_update(update);
                }
            }
        }
    }

    state.shutdown();
    debug!("Coordinator loop stopped");
}

impl CoordinatorState {
    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe {
                source,
                token,
                start_if_needed,
                callback,
            } => self.subscribe(source, token, start_if_needed, callback),
            Command::Unsubscribe { source, token } => self.unsubscribe(&source, token),
            Command::CancelAndRemove { source } => self.cancel_and_remove(&source),
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown => {}
        }
    }

    fn subscribe(
        &mut self,
        source: ArchiveSource,
        token: SubscriberToken,
        start_if_needed: bool,
        callback: StatusCallback,
    ) {
        let entry = self
            .entries
            .entry(source.clone())
            .or_insert_with(SourceEntry::new);
        entry.hub.attach_as(token, callback);
        debug!("Subscriber {} attached to {}", token, source);

        if entry.job.is_some() || !start_if_needed {
            entry.hub.replay_to(token);
            return;
        }

        self.start_job(source);
    }

    fn start_job(&mut self, source: ArchiveSource) {
        let job_id = self.next_job_id;
        self.next_job_id += 1;

        let destination = source.destination(&self.config.temp_directory);
        let job = ArchiveJob::new(job_id, source.clone(), destination);

        let Some(entry) = self.entries.get_mut(&source) else {
            return;
        };
        entry.job = Some(job.clone());
        self.jobs_started += 1;
        self.events
            .send(ArchiveEvent::new(&source, Some(job_id), ArchiveStatus::Waiting));
        entry.hub.publish(ArchiveStatus::Waiting);

        if self.draining.contains_key(&source) {
            entry.deferred = true;
            info!(
                "Deferring archive job {} for {} until the cancelled run stops",
                job_id, source
            );
            return;
        }

        info!("Starting archive job {} for {}", job_id, source);
        self.submit(job);
    }

    fn submit(&mut self, job: ArchiveJob) {
        let submitted = match &self.pool {
            Some(pool) => pool.submit(job.clone()),
            None => Err(WorkerError::ChannelClosed),
        };
        if let Err(e) = submitted {
            error!("Failed to submit archive job {}: {}", job.id, e);
            self.handle_update(JobUpdate::new(
                &job,
                ArchiveStatus::Fail(ArchiveError::Shutdown),
            ));
        }
    }

    /// Releases the source once its cancelled job has stopped, starting the
    /// job that was deferred behind it.
    fn finish_draining(&mut self, update: &JobUpdate) {
        if !update.status.is_terminal()
            || self.draining.get(&update.source) != Some(&update.job_id)
        {
            return;
        }
        self.draining.remove(&update.source);
        debug!(
            "Cancelled job {} for {} has stopped",
            update.job_id, update.source
        );

        let deferred = match self.entries.get_mut(&update.source) {
            Some(entry) if entry.deferred => {
                entry.deferred = false;
                entry.job.clone()
            }
            _ => None,
        };
        if let Some(job) = deferred {
            info!("Starting deferred archive job {} for {}", job.id, job.source);
            self.submit(job);
        }
    }

    fn handle_update(&mut self, update: JobUpdate) {
        self.finish_draining(&update);

        let Some(entry) = self.entries.get_mut(&update.source) else {
            debug!("Dropping status for removed source {}", update.source);
            return;
        };

        let current = entry.job.as_ref().map(|job| job.id);
        if current != Some(update.job_id) || entry.hub.status().is_terminal() {
            debug!(
                "Dropping stale status of job {} for {}",
                update.job_id, update.source
            );
            return;
        }

        let terminal = update.status.is_terminal();
        self.events.send(ArchiveEvent::new(
            &update.source,
            Some(update.job_id),
            update.status.clone(),
        ));
        entry.hub.publish(update.status);

        if terminal {
            self.jobs_finished += 1;
            if entry.is_evictable() {
                self.entries.remove(&update.source);
                debug!("Evicted {} after completion", update.source);
            }
        }
    }

    fn unsubscribe(&mut self, source: &ArchiveSource, token: SubscriberToken) {
        let Some(entry) = self.entries.get_mut(source) else {
            return;
        };
        if entry.hub.detach(token) {
            debug!("Subscriber {} detached from {}", token, source);
        }
        if entry.is_evictable() {
            self.entries.remove(source);
            debug!("Evicted idle {}", source);
        }
    }

    fn cancel_and_remove(&mut self, source: &ArchiveSource) {
        if let Some(entry) = self.entries.remove(source) {
            self.cancel_entry(source, entry);
            info!("Removed {}", source);
        }
    }

    fn cancel_entry(&mut self, source: &ArchiveSource, mut entry: SourceEntry) {
        let in_flight = entry.job_in_flight();
        if let Some(job) = entry.job.take() {
            job.cancel();
            if in_flight && !entry.deferred {
                self.draining.insert(source.clone(), job.id);
            }
            if in_flight {
                let status = ArchiveStatus::Fail(ArchiveError::Cancelled);
                self.events
                    .send(ArchiveEvent::new(source, Some(job.id), status.clone()));
                entry.hub.publish(status);
                self.jobs_finished += 1;
            }
        }
    }

    fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            jobs_started: self.jobs_started,
            jobs_finished: self.jobs_finished,
            active_sources: self.entries.len(),
            subscribers: self
                .entries
                .values()
                .map(|entry| entry.hub.subscriber_count())
                .sum(),
        }
    }

    fn shutdown(&mut self) {
        let entries: Vec<(ArchiveSource, SourceEntry)> = self.entries.drain().collect();
        for (source, entry) in entries {
            self.cancel_entry(&source, entry);
        }
        self.draining.clear();

        if let Some(pool) = self.pool.take() {
            pool.shutdown();
            pool.wait();
        }
    }
}
