//! Per-source status cache and subscriber registry.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::status::ArchiveStatus;

pub type StatusCallback = Arc<dyn Fn(&ArchiveStatus) + Send + Sync>;

/// Stable handle for a subscriber registered on a [`StatusHub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberToken(pub(crate) u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl SubscriberToken {
    /// Process-wide unique token.
    pub(crate) fn next() -> Self {
        SubscriberToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriberToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Latest known status of one source plus everyone listening to it.
///
/// Not synchronized: the hub lives on the coordinator thread, which is the
/// only place `publish`, `attach` and `detach` are called from.
#[derive(Default)]
pub struct StatusHub {
    status: ArchiveStatus,
    subscribers: Vec<(SubscriberToken, StatusCallback)>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> &ArchiveStatus {
        &self.status
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Registers `callback` and returns its removal handle. Delivery follows
    /// attach order.
    pub fn attach(&mut self, callback: StatusCallback) -> SubscriberToken {
        let token = SubscriberToken::next();
        self.attach_as(token, callback);
        token
    }

    /// Registers `callback` under a token the caller already handed out.
    pub(crate) fn attach_as(&mut self, token: SubscriberToken, callback: StatusCallback) {
        self.subscribers.push((token, callback));
    }

    /// Removes a subscriber. Unknown tokens are ignored.
    pub fn detach(&mut self, token: SubscriberToken) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(t, _)| *t != token);
        before != self.subscribers.len()
    }

    /// Caches `status` and delivers it to every current subscriber.
    pub fn publish(&mut self, status: ArchiveStatus) {
        self.status = status;

        // Callbacks run against a snapshot of the subscriber list.
        let snapshot: Vec<StatusCallback> =
            self.subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in snapshot {
            callback(&self.status);
        }
    }

    /// Delivers the cached status to a single subscriber.
    pub fn replay_to(&self, token: SubscriberToken) {
        if let Some((_, callback)) = self.subscribers.iter().find(|(t, _)| *t == token) {
            callback(&self.status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (StatusCallback, Arc<Mutex<Vec<ArchiveStatus>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: StatusCallback = Arc::new(move |s: &ArchiveStatus| {
            sink.lock().unwrap().push(s.clone());
        });
        (callback, seen)
    }

    #[test]
    fn test_new_hub_is_idle() {
        let hub = StatusHub::new();
        assert_eq!(hub.status(), &ArchiveStatus::None);
        assert!(hub.is_empty());
    }

    #[test]
    fn test_publish_reaches_all_subscribers_in_order() {
        let mut hub = StatusHub::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3u64 {
            let order = Arc::clone(&order);
            hub.attach(Arc::new(move |_s: &ArchiveStatus| {
                order.lock().unwrap().push(id)
            }));
        }

        hub.publish(ArchiveStatus::Waiting);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(hub.status(), &ArchiveStatus::Waiting);
    }

    #[test]
    fn test_detach_isolates_subscriber() {
        let mut hub = StatusHub::new();
        let (first, first_seen) = recorder();
        let (second, second_seen) = recorder();
        let first_token = hub.attach(first);
        let second_token = hub.attach(second);
        assert_ne!(first_token, second_token);

        hub.publish(ArchiveStatus::Waiting);
        assert!(hub.detach(first_token));
        assert!(!hub.detach(first_token));
        hub.publish(ArchiveStatus::progress(0.5));

        assert_eq!(first_seen.lock().unwrap().len(), 1);
        assert_eq!(
            *second_seen.lock().unwrap(),
            vec![ArchiveStatus::Waiting, ArchiveStatus::Progress(0.5)]
        );
    }

    #[test]
    fn test_detach_unknown_token_is_noop() {
        let mut hub = StatusHub::new();
        assert!(!hub.detach(SubscriberToken(99)));
    }

    #[test]
    fn test_replay_only_targets_one_subscriber() {
        let mut hub = StatusHub::new();
        let (first, first_seen) = recorder();
        let (second, second_seen) = recorder();
        hub.attach(first);
        hub.publish(ArchiveStatus::progress(0.3));
        let late = hub.attach(second);

        hub.replay_to(late);

        assert_eq!(first_seen.lock().unwrap().len(), 1);
        assert_eq!(*second_seen.lock().unwrap(), vec![ArchiveStatus::Progress(0.3)]);
    }
}
