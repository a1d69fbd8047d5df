//! Logging setup shared by binaries and tests.
//!
//! Library code logs through the `log` facade; `init_logging` routes those
//! records into a `tracing` subscriber so spans from the workers and plain
//! log lines end up in the same output.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to bridge log records: {0}")]
    Bridge(#[from] log::SetLoggerError),

    #[error("Failed to install subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `default_level`. Calling this a second time returns
/// an error and leaves the first subscriber in place.
///
/// The `log` bridge goes in first: if another `log` logger already owns the
/// facade, nothing is installed at all.
pub fn init_logging(format: LogFormat, default_level: &str) -> Result<(), LoggingError> {
    tracing_log::LogTracer::init()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_target(true)),
        )?,
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))?
        }
    }

    Ok(())
}
