//! Broadcasting of archive activity for real-time event streaming.

pub mod archive_events;

pub use archive_events::{ArchiveEvent, ArchiveEventBroadcaster};
