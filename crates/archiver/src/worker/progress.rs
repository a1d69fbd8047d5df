use crate::worker::job::JobUpdate;

/// Receives the statuses a worker produces while running a job.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: JobUpdate);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _update: JobUpdate) {}
}

/// Forwards updates into a crossbeam channel.
pub struct ChannelProgress {
    sender: crossbeam_channel::Sender<JobUpdate>,
}

impl ChannelProgress {
    pub fn new(sender: crossbeam_channel::Sender<JobUpdate>) -> Self {
        Self { sender }
    }
}

impl ProgressReporter for ChannelProgress {
    fn report(&self, update: JobUpdate) {
        // Receiver gone means nobody is listening anymore
        let _ = self.sender.send(update);
    }
}
