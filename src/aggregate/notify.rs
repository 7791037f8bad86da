//! Summary notification worker.
//!
//! The aggregator enqueues `SummaryChange`s onto an unbounded channel while
//! holding its state lock, which fixes delivery order. A dedicated worker
//! drains the queue and hands each change to the registered observers and
//! streams.
//!
//! Registrations live in a shared [`Subscribers`] table rather than being
//! owned by the worker, so registering never waits on the worker thread. An
//! observer may therefore subscribe, add or remove observers, or drop streams
//! from inside its own callback.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::error::{AlarmError, AlarmResult, NotificationError};
use crate::level::AlarmLevel;

use super::stream::SummaryStream;

/// A published transition of the summary level.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryChange {
    /// Monotonically increasing per aggregator, starting at 1.
    pub sequence: u64,
    pub previous: AlarmLevel,
    pub current: AlarmLevel,
    pub timestamp: DateTime<Utc>,
}

/// Receiver of summary transitions, e.g. a rendering collaborator.
pub trait SummaryObserver: Send + Sync {
    /// Called once per transition, in transition order, from the notification worker.
    fn on_summary_changed(&self, level: AlarmLevel);
}

impl<F> SummaryObserver for F
where
    F: Fn(AlarmLevel) + Send + Sync,
{
    fn on_summary_changed(&self, level: AlarmLevel) {
        self(level);
    }
}

/// Unique identifier for a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverId(Uuid);

impl ObserverId {
    /// Create a new random observer id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a summary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(Uuid);

impl StreamId {
    /// Create a new random stream id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

struct ObserverEntry {
    id: ObserverId,
    /// Changes with a sequence at or below this were published before registration.
    after: u64,
    observer: Arc<dyn SummaryObserver>,
}

struct StreamEntry {
    after: u64,
    tx: Sender<SummaryChange>,
}

/// Registration table shared by the channel handle, the worker, and streams.
#[derive(Default)]
pub(crate) struct Subscribers {
    observers: Vec<ObserverEntry>,
    streams: HashMap<StreamId, StreamEntry>,
    /// Set once the worker has exited; later registrations are refused.
    closed: bool,
}

pub(crate) type SharedSubscribers = Arc<Mutex<Subscribers>>;

// Every mutation is a single insert or remove, so a poisoned table is still consistent.
pub(crate) fn lock_subscribers(subscribers: &Mutex<Subscribers>) -> MutexGuard<'_, Subscribers> {
    subscribers.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Subscribers {
    pub(crate) fn remove_stream(&mut self, stream_id: StreamId) -> bool {
        self.streams.remove(&stream_id).is_some()
    }
}

/// Notification channel: owns subscriber registrations and delivers transitions.
pub struct NotificationChannel {
    cfg: NotificationConfig,
    change_tx: Sender<SummaryChange>,
    subscribers: SharedSubscribers,
    /// Sequence of the newest change handed to `publish`.
    last_sequence: AtomicU64,
    dropped_events: Arc<AtomicU64>,
}

impl fmt::Debug for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("cfg", &self.cfg)
            .field("last_sequence", &self.last_sequence.load(Ordering::Acquire))
            .field("dropped_events", &self.dropped_events())
            .finish_non_exhaustive()
    }
}

fn disconnected() -> AlarmError {
    AlarmError::Notification(NotificationError::Disconnected {
        path: "notification_worker".to_string(),
    })
}

impl NotificationChannel {
    /// Start the notification worker.
    ///
    /// The worker is detached; it exits once this channel is dropped and the
    /// queue is drained.
    pub fn new(cfg: NotificationConfig) -> AlarmResult<Self> {
        let (change_tx, change_rx) = unbounded::<SummaryChange>();
        let subscribers: SharedSubscribers = Arc::new(Mutex::new(Subscribers::default()));
        let dropped_events = Arc::new(AtomicU64::new(0));

        let worker_subscribers = Arc::clone(&subscribers);
        let worker_dropped_events = Arc::clone(&dropped_events);
        thread::Builder::new()
            .name("alarm-summary-notify".to_string())
            .spawn(move || worker_loop(&change_rx, &worker_subscribers, &worker_dropped_events))
            .map_err(|e| AlarmError::internal(format!("failed to spawn notification worker: {e}")))?;

        Ok(Self {
            cfg,
            change_tx,
            subscribers,
            last_sequence: AtomicU64::new(0),
            dropped_events,
        })
    }

    /// Enqueue a transition. Never blocks.
    ///
    /// Returns false if the worker is gone.
    pub(crate) fn publish(&self, change: SummaryChange) -> bool {
        self.last_sequence.fetch_max(change.sequence, Ordering::AcqRel);
        self.change_tx.send(change).is_ok()
    }

    /// Register a stream receiving every transition published after this call returns.
    pub fn subscribe(&self) -> AlarmResult<SummaryStream> {
        let stream_id = StreamId::new();
        let (tx, rx) = bounded::<SummaryChange>(self.cfg.stream_capacity.max(1));

        let mut subscribers = lock_subscribers(&self.subscribers);
        if subscribers.closed {
            return Err(disconnected());
        }
        let after = self.last_sequence.load(Ordering::Acquire);
        subscribers.streams.insert(stream_id, StreamEntry { after, tx });
        drop(subscribers);

        Ok(SummaryStream::new(stream_id, rx, Arc::downgrade(&self.subscribers)))
    }

    /// Register an observer called for every transition published after this call returns.
    pub fn add_observer(&self, observer: Arc<dyn SummaryObserver>) -> AlarmResult<ObserverId> {
        let id = ObserverId::new();
        let mut subscribers = lock_subscribers(&self.subscribers);
        if subscribers.closed {
            return Err(disconnected());
        }
        let after = self.last_sequence.load(Ordering::Acquire);
        subscribers.observers.push(ObserverEntry { id, after, observer });
        Ok(id)
    }

    /// Remove an observer. Returns false if it was not registered.
    ///
    /// A change already being dispatched may still reach the observer once.
    #[must_use]
    pub fn remove_observer(&self, observer_id: ObserverId) -> bool {
        let mut subscribers = lock_subscribers(&self.subscribers);
        let before = subscribers.observers.len();
        subscribers.observers.retain(|entry| entry.id != observer_id);
        subscribers.observers.len() != before
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        lock_subscribers(&self.subscribers).observers.len()
    }

    /// Number of registered streams.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        lock_subscribers(&self.subscribers).streams.len()
    }

    /// Transitions dropped because a stream buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

fn worker_loop(change_rx: &Receiver<SummaryChange>, subscribers: &SharedSubscribers, dropped_events: &AtomicU64) {
    for change in change_rx {
        // Observers are called on a snapshot with the table unlocked.
        let observers: Vec<Arc<dyn SummaryObserver>> = lock_subscribers(subscribers)
            .observers
            .iter()
            .filter(|entry| change.sequence > entry.after)
            .map(|entry| Arc::clone(&entry.observer))
            .collect();
        for observer in &observers {
            observer.on_summary_changed(change.current);
        }
        drop(observers);

        // Never block the worker: drop if a stream is slow.
        lock_subscribers(subscribers).streams.retain(|_, entry| {
            if change.sequence <= entry.after {
                return true;
            }
            match entry.tx.try_send(change.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    dropped_events.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }

    // Engine gone: let stream receivers observe disconnection.
    let mut subscribers = lock_subscribers(subscribers);
    subscribers.closed = true;
    subscribers.observers.clear();
    subscribers.streams.clear();
    debug!("notification worker exiting");
}
