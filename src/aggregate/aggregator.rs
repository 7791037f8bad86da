//! Worst-case summary computation.
//!
//! Every event runs read-modify-recompute-publish under one lock, so two
//! concurrent events can never publish interleaved or contradictory
//! transitions. Publishing only enqueues; observers run on the notification
//! worker.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::level::AlarmLevel;
use crate::signal::Address;
use crate::transport::ChannelEventSink;

use super::notify::{NotificationChannel, SummaryChange};
use super::state::{AlarmStateStore, ChannelState, Epoch};

/// Reduce channel states to one level.
///
/// Any disconnected channel, or no channels at all, yields `Disconnected`.
/// Otherwise the result is the highest severity.
pub fn compute_summary<'a, I>(states: I) -> AlarmLevel
where
    I: IntoIterator<Item = &'a ChannelState>,
{
    let mut worst: Option<AlarmLevel> = None;
    for state in states {
        if !state.connected {
            return AlarmLevel::Disconnected;
        }
        worst = Some(worst.map_or(state.severity, |w| w.max(state.severity)));
    }
    worst.unwrap_or(AlarmLevel::Disconnected)
}

/// Current per-address states together with the summary computed from them.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSnapshot {
    pub channels: BTreeMap<Address, ChannelState>,
    pub summary: AlarmLevel,
    pub epoch: Epoch,
}

/// What happened to an incoming event.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The event updated a tracked address; `change` is set if the summary moved.
    Applied { change: Option<SummaryChange> },
    /// The address is not tracked in the event's generation; nothing changed.
    Stale,
}

#[derive(Debug)]
struct Inner {
    store: AlarmStateStore,
    published: AlarmLevel,
    sequence: u64,
}

/// Owns the state store and the last published summary.
#[derive(Debug)]
pub struct Aggregator {
    inner: Mutex<Inner>,
    notifier: NotificationChannel,
}

impl Aggregator {
    /// Creates an aggregator with nothing tracked and `Disconnected` published.
    #[must_use]
    pub fn new(notifier: NotificationChannel) -> Self {
        Self {
            inner: Mutex::new(Inner {
                store: AlarmStateStore::new(),
                published: AlarmLevel::Disconnected,
                sequence: 0,
            }),
            notifier,
        }
    }

    // Mutations are single-field writes, so a poisoned guard still holds consistent state.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The notification channel transitions are published to.
    #[must_use]
    pub const fn notifier(&self) -> &NotificationChannel {
        &self.notifier
    }

    /// Current generation of the tracked address set.
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.lock().store.epoch()
    }

    /// Last published summary.
    #[must_use]
    pub fn summary(&self) -> AlarmLevel {
        self.lock().published
    }

    /// Consistent copy of the tracked states and summary.
    #[must_use]
    pub fn snapshot(&self) -> AggregationSnapshot {
        let inner = self.lock();
        AggregationSnapshot {
            channels: inner.store.to_map(),
            summary: inner.published,
            epoch: inner.store.epoch(),
        }
    }

    /// Connection event for `address` from a subscription created in `epoch`.
    pub fn on_connection_event(&self, epoch: Epoch, address: &Address, connected: bool) -> EventOutcome {
        let mut inner = self.lock();
        let applied = inner.store.set_connected(epoch, address, connected);
        self.settle(&mut inner, applied, epoch, address)
    }

    /// Severity event for `address` from a subscription created in `epoch`.
    pub fn on_severity_event(&self, epoch: Epoch, address: &Address, severity: AlarmLevel) -> EventOutcome {
        let mut inner = self.lock();
        let applied = inner.store.set_severity(epoch, address, severity);
        self.settle(&mut inner, applied, epoch, address)
    }

    fn settle(&self, inner: &mut Inner, applied: bool, epoch: Epoch, address: &Address) -> EventOutcome {
        if !applied {
            trace!(address = %address, epoch = epoch.get(), "dropping stale channel event");
            return EventOutcome::Stale;
        }
        EventOutcome::Applied {
            change: self.recompute_locked(inner),
        }
    }

    /// Start tracking `addresses` in generation `epoch`.
    ///
    /// Returns the transition, if tracking new disconnected channels moved the summary.
    pub(crate) fn track(&self, epoch: Epoch, addresses: &[Address]) -> Option<SummaryChange> {
        let mut inner = self.lock();
        let mut added = false;
        for address in addresses {
            added |= inner.store.track(epoch, address);
        }
        if added {
            self.recompute_locked(&mut inner)
        } else {
            None
        }
    }

    /// Forget every address, move to a new generation, and publish `Disconnected`
    /// if it differs from the last published summary.
    pub(crate) fn reset(&self) -> Epoch {
        let mut inner = self.lock();
        let epoch = inner.store.clear();
        self.recompute_locked(&mut inner);
        epoch
    }

    fn recompute_locked(&self, inner: &mut Inner) -> Option<SummaryChange> {
        let next = inner.store.summary();
        if next == inner.published {
            return None;
        }

        inner.sequence += 1;
        let change = SummaryChange {
            sequence: inner.sequence,
            previous: inner.published,
            current: next,
            timestamp: Utc::now(),
        };
        inner.published = next;

        trace!(
            sequence = change.sequence,
            previous = %change.previous,
            current = %change.current,
            "alarm summary changed"
        );

        // Enqueue while still holding the lock so queue order matches transition order.
        if !self.notifier.publish(change.clone()) {
            warn!(sequence = change.sequence, "notification worker is gone; summary change not delivered");
        }
        Some(change)
    }
}

/// Sink handed to the transport for one address.
///
/// Holds only a weak reference so events arriving after the engine is gone are
/// no-ops.
pub(crate) struct ChannelSink {
    address: Address,
    epoch: Epoch,
    aggregator: Weak<Aggregator>,
}

impl ChannelSink {
    pub(crate) fn new(address: Address, epoch: Epoch, aggregator: Weak<Aggregator>) -> Self {
        Self {
            address,
            epoch,
            aggregator,
        }
    }
}

impl ChannelEventSink for ChannelSink {
    fn on_connection(&self, connected: bool) {
        if let Some(aggregator) = self.aggregator.upgrade() {
            aggregator.on_connection_event(self.epoch, &self.address, connected);
        }
    }

    fn on_severity(&self, severity: AlarmLevel) {
        if let Some(aggregator) = self.aggregator.upgrade() {
            aggregator.on_severity_event(self.epoch, &self.address, severity);
        }
    }
}
