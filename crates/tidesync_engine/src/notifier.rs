//! Status broadcast.
//!
//! The notifier fans out lifecycle changes and progress to any number of
//! observers:
//! - callbacks registered with [`StatusNotifier::subscribe_status`] and
//!   [`StatusNotifier::subscribe_progress`]
//! - channel receivers returned by [`StatusNotifier::subscribe`]
//!
//! Broadcasting never blocks on an observer. Callbacks run on the emitting
//! task, outside the notifier's lock, so a callback may itself subscribe or
//! unsubscribe. Channels are unbounded; dropped receivers are pruned on the
//! next emit.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use tidesync_protocol::SyncStatus;

/// Handle identifying one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// An event delivered to channel subscribers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncEvent {
    /// The lifecycle state changed.
    Status(SyncStatus),
    /// Progress of the current run, in `[0, 1]`.
    Progress(f64),
}

type StatusCallback = Arc<dyn Fn(SyncStatus) + Send + Sync>;
type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    status: Vec<(ListenerId, StatusCallback)>,
    progress: Vec<(ListenerId, ProgressCallback)>,
    channels: Vec<Sender<SyncEvent>>,
}

/// Broadcasts [`SyncStatus`] changes and run progress.
pub struct StatusNotifier {
    listeners: RwLock<Listeners>,
    current: RwLock<SyncStatus>,
    next_id: AtomicU64,
}

impl StatusNotifier {
    /// Creates a notifier with no listeners, in the `Idle` state.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Listeners::default()),
            current: RwLock::new(SyncStatus::Idle),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a callback for status changes.
    pub fn subscribe_status<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(SyncStatus) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.listeners.write().status.push((id, Arc::new(callback)));
        id
    }

    /// Registers a callback for progress changes.
    pub fn subscribe_progress<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.listeners.write().progress.push((id, Arc::new(callback)));
        id
    }

    /// Removes a callback. Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.status.len() + listeners.progress.len();
        listeners.status.retain(|(l, _)| *l != id);
        listeners.progress.retain(|(l, _)| *l != id);
        before != listeners.status.len() + listeners.progress.len()
    }

    /// Returns a receiver for every future event.
    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        let (tx, rx) = mpsc::channel();
        self.listeners.write().channels.push(tx);
        rx
    }

    /// Returns the last broadcast status.
    pub fn current(&self) -> SyncStatus {
        *self.current.read()
    }

    /// Returns the number of registered callbacks and channels.
    pub fn listener_count(&self) -> usize {
        let listeners = self.listeners.read();
        listeners.status.len() + listeners.progress.len() + listeners.channels.len()
    }

    /// Broadcasts a status change.
    pub fn set_status(&self, status: SyncStatus) {
        *self.current.write() = status;
        tracing::trace!(%status, "status changed");

        let callbacks: Vec<StatusCallback> = self
            .listeners
            .read()
            .status
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(status);
        }
        self.send(SyncEvent::Status(status));
    }

    /// Broadcasts run progress, clamped to `[0, 1]`.
    pub fn set_progress(&self, progress: f64) {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };

        let callbacks: Vec<ProgressCallback> = self
            .listeners
            .read()
            .progress
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(progress);
        }
        self.send(SyncEvent::Progress(progress));
    }

    fn send(&self, event: SyncEvent) {
        let mut listeners = self.listeners.write();
        listeners.channels.retain(|tx| tx.send(event).is_ok());
    }
}

impl Default for StatusNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StatusNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusNotifier")
            .field("current", &self.current())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn multiple_listeners_all_receive() {
        let notifier = StatusNotifier::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&first);
        notifier.subscribe_status(move |s| sink.lock().push(s));
        let sink = Arc::clone(&second);
        notifier.subscribe_status(move |s| sink.lock().push(s));

        notifier.set_status(SyncStatus::Syncing);
        notifier.set_status(SyncStatus::Completed);

        let expected = vec![SyncStatus::Syncing, SyncStatus::Completed];
        assert_eq!(*first.lock(), expected);
        assert_eq!(*second.lock(), expected);
        assert_eq!(notifier.current(), SyncStatus::Completed);
    }

    #[test]
    fn progress_is_clamped() {
        let notifier = StatusNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        notifier.subscribe_progress(move |p| sink.lock().push(p));

        notifier.set_progress(-0.5);
        notifier.set_progress(0.5);
        notifier.set_progress(3.0);
        notifier.set_progress(f64::NAN);

        assert_eq!(*seen.lock(), vec![0.0, 0.5, 1.0, 0.0]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let notifier = StatusNotifier::new();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let id = notifier.subscribe_status(move |_| *sink.lock() += 1);

        notifier.set_status(SyncStatus::Syncing);
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.set_status(SyncStatus::Idle);

        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn channel_subscribers_and_pruning() {
        let notifier = StatusNotifier::new();
        let rx = notifier.subscribe();
        let dropped = notifier.subscribe();
        drop(dropped);

        notifier.set_status(SyncStatus::Syncing);
        notifier.set_progress(0.25);

        assert_eq!(rx.try_recv().unwrap(), SyncEvent::Status(SyncStatus::Syncing));
        assert_eq!(rx.try_recv().unwrap(), SyncEvent::Progress(0.25));
        assert_eq!(notifier.listener_count(), 1);
    }

    #[test]
    fn callback_may_subscribe_reentrantly() {
        let notifier = Arc::new(StatusNotifier::new());
        let inner = Arc::clone(&notifier);
        notifier.subscribe_status(move |_| {
            inner.subscribe_progress(|_| {});
        });

        notifier.set_status(SyncStatus::Syncing);
        assert_eq!(notifier.listener_count(), 2);
    }
}
