//! Subscriber handles returned by the coordinator.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::coordinator::Command;
use crate::hub::SubscriberToken;
use crate::source::ArchiveSource;
use crate::status::ArchiveStatus;

/// Registration of one subscriber on one source's hub.
///
/// Dropping it (or calling [`Subscription::cancel`]) detaches the subscriber.
/// Detaching never affects the running job or other subscribers.
pub struct Subscription {
    source: ArchiveSource,
    token: SubscriberToken,
    commands: Sender<Command>,
    attached: bool,
}

impl Subscription {
    pub(crate) fn new(source: ArchiveSource, token: SubscriberToken, commands: Sender<Command>) -> Self {
        Self {
            source,
            token,
            commands,
            attached: true,
        }
    }

    pub fn source(&self) -> &ArchiveSource {
        &self.source
    }

    pub fn token(&self) -> SubscriberToken {
        self.token
    }

    pub fn cancel(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        // Fails only once the coordinator is gone, and the hub with it
        let _ = self.commands.send(Command::Unsubscribe {
            source: self.source.clone(),
            token: self.token,
        });
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Ordered statuses of one source, as seen by one subscriber.
///
/// The first value is the replayed cached status (or `Waiting` for a job
/// this subscription started). The stream ends after the first terminal
/// status, or when the source is removed from the coordinator.
pub struct StatusStream {
    subscription: Subscription,
    receiver: Receiver<ArchiveStatus>,
    finished: bool,
}

impl StatusStream {
    pub(crate) fn new(subscription: Subscription, receiver: Receiver<ArchiveStatus>) -> Self {
        Self {
            subscription,
            receiver,
            finished: false,
        }
    }

    pub fn source(&self) -> &ArchiveSource {
        self.subscription.source()
    }

    pub fn token(&self) -> SubscriberToken {
        self.subscription.token()
    }

    /// True once a terminal status was returned or the hub went away.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Blocks until the next status. `None` once the stream has ended.
    pub fn recv(&mut self) -> Option<ArchiveStatus> {
        if self.finished {
            return None;
        }
        match self.receiver.recv() {
            Ok(status) => Some(self.observe(status)),
            Err(_) => {
                self.finished = true;
                None
            }
        }
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    ///
    /// A timeout returns `None` without ending the stream; check
    /// [`is_finished`](Self::is_finished) to tell the two apart.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<ArchiveStatus> {
        if self.finished {
            return None;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(status) => Some(self.observe(status)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                None
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<ArchiveStatus> {
        if self.finished {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(status) => Some(self.observe(status)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finished = true;
                None
            }
        }
    }

    /// Blocks until the job reaches a terminal status and returns it.
    ///
    /// Returns `None` if the source was removed or the coordinator shut down
    /// before a terminal status was delivered to this stream.
    pub fn wait(mut self) -> Option<ArchiveStatus> {
        while let Some(status) = self.recv() {
            if status.is_terminal() {
                return Some(status);
            }
        }
        None
    }

    /// Detaches from the hub. Same as dropping the stream.
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn observe(&mut self, status: ArchiveStatus) -> ArchiveStatus {
        if status.is_terminal() {
            self.finished = true;
        }
        status
    }
}

impl Iterator for StatusStream {
    type Item = ArchiveStatus;

    fn next(&mut self) -> Option<ArchiveStatus> {
        self.recv()
    }
}
