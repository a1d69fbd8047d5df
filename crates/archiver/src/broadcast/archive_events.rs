//! Activity feed of archive status transitions across all sources.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::source::ArchiveSource;
use crate::status::ArchiveStatus;

/// One status transition of one source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEvent {
    /// Identity of the archived source.
    pub source_id: u64,
    /// Path the source points at.
    pub source_path: String,
    /// Job that produced the status, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<u64>,
    pub status: ArchiveStatus,
    pub timestamp: DateTime<Utc>,
}

impl ArchiveEvent {
    pub fn new(source: &ArchiveSource, job_id: Option<u64>, status: ArchiveStatus) -> Self {
        Self {
            source_id: source.id(),
            source_path: source.path().to_string_lossy().to_string(),
            job_id,
            status,
            timestamp: Utc::now(),
        }
    }
}

/// Broadcasts archive events to any number of listeners.
///
/// Slow receivers lag and lose events; per-source delivery goes through the
/// coordinator's hubs, this feed is for dashboards and logs.
#[derive(Clone)]
pub struct ArchiveEventBroadcaster {
    sender: Arc<broadcast::Sender<ArchiveEvent>>,
}

impl ArchiveEventBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: ArchiveEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArchiveEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ArchiveEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = ArchiveEventBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        let source = ArchiveSource::with_id(12, "/tmp/folder");
        broadcaster.send(ArchiveEvent::new(&source, Some(1), ArchiveStatus::Waiting));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.source_id, 12);
        assert_eq!(received.source_path, "/tmp/folder");
        assert_eq!(received.job_id, Some(1));
        assert_eq!(received.status, ArchiveStatus::Waiting);
    }

    #[test]
    fn test_send_without_receivers_is_fine() {
        let broadcaster = ArchiveEventBroadcaster::default();
        let source = ArchiveSource::with_id(1, "/tmp/a");
        broadcaster.send(ArchiveEvent::new(&source, None, ArchiveStatus::None));
        assert_eq!(broadcaster.receiver_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let source = ArchiveSource::with_id(3, "/tmp/b");
        let event = ArchiveEvent::new(
            &source,
            Some(2),
            ArchiveStatus::Done(PathBuf::from("/tmp/tarchive-3.zip")),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sourceId"], 3);
        assert_eq!(json["jobId"], 2);
        assert_eq!(json["status"]["state"], "done");
    }
}
