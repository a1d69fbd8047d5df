pub mod broadcast;
pub mod compress;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hub;
pub mod logging;
pub mod source;
pub mod status;
pub mod stream;
pub mod worker;

pub use broadcast::{ArchiveEvent, ArchiveEventBroadcaster};
pub use compress::{CompressRequest, Compressor, ZipCompressor};
pub use config::{load_config, load_config_from_str, ArchiverConfig, CompressionLevel};
pub use coordinator::{ArchiveCoordinator, CoordinatorStats};
pub use error::{ArchiveError, ArchiverError, ConfigError, Result, WorkerError};
pub use hub::{StatusCallback, StatusHub, SubscriberToken};
pub use logging::{init_logging, LogFormat, LoggingError};
pub use source::ArchiveSource;
pub use status::ArchiveStatus;
pub use stream::{StatusStream, Subscription};
