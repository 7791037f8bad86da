//! Transport seam: how the engine subscribes to per-address events.
//!
//! The transport owns connectivity and retry. The engine hands it one
//! [`ChannelEventSink`] per address and reacts to whatever the sink is told.
//!
//! [`InMemoryTransport`] is a thread-safe reference implementation for embedded
//! use and tests.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SubscriptionError;
use crate::level::AlarmLevel;
use crate::signal::Address;

/// Unique identifier for a transport subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned by [`Transport::subscribe`]; must be passed back to
/// [`Transport::unsubscribe`] exactly once.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub address: Address,
}

/// Receiver of connection and severity events for one address.
///
/// Implementations must be callable from any thread at any time, including
/// after the subscription has been released.
pub trait ChannelEventSink: Send + Sync {
    /// The address connected (`true`) or disconnected (`false`).
    fn on_connection(&self, connected: bool);

    /// The address reported a new alarm severity.
    fn on_severity(&self, severity: AlarmLevel);
}

/// Subscription service delivering per-address events.
pub trait Transport: Send + Sync {
    /// Begin delivering events for `address` to `sink`.
    fn subscribe(
        &self,
        address: &Address,
        sink: Arc<dyn ChannelEventSink>,
    ) -> Result<SubscriptionHandle, SubscriptionError>;

    /// Stop delivering events for a subscription.
    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), SubscriptionError>;
}

#[derive(Default)]
struct TransportState {
    subscriptions: HashMap<SubscriptionId, (Address, Arc<dyn ChannelEventSink>)>,
    reject_subscribe: HashSet<Address>,
    reject_unsubscribe: HashSet<Address>,
    unsubscribe_attempts: usize,
}

/// In-memory transport.
///
/// Events are delivered synchronously on the publishing thread. Sinks are
/// cloned out of the lock before being invoked, so a sink may call back into
/// the transport.
#[derive(Default)]
pub struct InMemoryTransport {
    state: RwLock<TransportState>,
}

impl fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("active_subscriptions", &self.active_subscriptions())
            .finish()
    }
}

impl InMemoryTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `subscribe` for `address` fail.
    pub fn reject_subscriptions_to(&self, address: impl Into<Address>) {
        if let Ok(mut state) = self.state.write() {
            state.reject_subscribe.insert(address.into());
        }
    }

    /// Make every future `unsubscribe` for `address` fail.
    ///
    /// The subscription is still dropped on the transport side, as a flaky
    /// release would leave it in practice.
    pub fn reject_releases_of(&self, address: impl Into<Address>) {
        if let Ok(mut state) = self.state.write() {
            state.reject_unsubscribe.insert(address.into());
        }
    }

    /// Clear all injected failures.
    pub fn heal(&self) {
        if let Ok(mut state) = self.state.write() {
            state.reject_subscribe.clear();
            state.reject_unsubscribe.clear();
        }
    }

    /// Deliver a connection event to every sink subscribed to `address`.
    ///
    /// Returns the number of sinks reached.
    pub fn publish_connection(&self, address: &Address, connected: bool) -> usize {
        let sinks = self.sinks_for(address);
        for sink in &sinks {
            sink.on_connection(connected);
        }
        sinks.len()
    }

    /// Deliver a severity event to every sink subscribed to `address`.
    ///
    /// Returns the number of sinks reached.
    pub fn publish_severity(&self, address: &Address, severity: AlarmLevel) -> usize {
        let sinks = self.sinks_for(address);
        for sink in &sinks {
            sink.on_severity(severity);
        }
        sinks.len()
    }

    /// Snapshot of the sinks currently subscribed to `address`.
    ///
    /// Holding on to a sink past a release lets a caller replay in-flight
    /// events that race with teardown.
    #[must_use]
    pub fn sinks_for(&self, address: &Address) -> Vec<Arc<dyn ChannelEventSink>> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        state
            .subscriptions
            .values()
            .filter(|(addr, _)| addr == address)
            .map(|(_, sink)| Arc::clone(sink))
            .collect()
    }

    /// Number of live subscriptions for `address`.
    #[must_use]
    pub fn subscriber_count(&self, address: &Address) -> usize {
        self.state
            .read()
            .map(|s| s.subscriptions.values().filter(|(addr, _)| addr == address).count())
            .unwrap_or(0)
    }

    /// Number of live subscriptions across all addresses.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.state.read().map(|s| s.subscriptions.len()).unwrap_or(0)
    }

    /// Number of `unsubscribe` calls received, failed ones included.
    #[must_use]
    pub fn unsubscribe_attempts(&self) -> usize {
        self.state.read().map(|s| s.unsubscribe_attempts).unwrap_or(0)
    }
}

impl Transport for InMemoryTransport {
    fn subscribe(
        &self,
        address: &Address,
        sink: Arc<dyn ChannelEventSink>,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        let mut state = self.state.write().map_err(|_| SubscriptionError::Unavailable {
            reason: "poisoned lock: transport".to_string(),
        })?;

        if state.reject_subscribe.contains(address) {
            return Err(SubscriptionError::Rejected {
                address: address.clone(),
                reason: "injected subscribe failure".to_string(),
            });
        }

        let id = SubscriptionId::new();
        state.subscriptions.insert(id, (address.clone(), sink));
        Ok(SubscriptionHandle {
            id,
            address: address.clone(),
        })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), SubscriptionError> {
        let mut state = self.state.write().map_err(|_| SubscriptionError::Unavailable {
            reason: "poisoned lock: transport".to_string(),
        })?;

        state.unsubscribe_attempts += 1;
        state.subscriptions.remove(&handle.id);

        if state.reject_unsubscribe.contains(&handle.address) {
            return Err(SubscriptionError::ReleaseFailed {
                address: handle.address,
                reason: "injected release failure".to_string(),
            });
        }
        Ok(())
    }
}
