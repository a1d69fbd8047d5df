pub mod job;
pub mod pool;
pub mod progress;

pub use job::{ArchiveJob, JobUpdate};
pub use pool::{run_job, WorkerPool};
pub use progress::{ChannelProgress, NoopProgress, ProgressReporter};
