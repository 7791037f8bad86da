//! Authoritative per-address channel state.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::level::AlarmLevel;
use crate::signal::Address;

use super::aggregator::compute_summary;

/// Connection flag and severity of one tracked address.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    pub connected: bool,
    pub severity: AlarmLevel,
}

impl Default for ChannelState {
    /// A freshly subscribed address: not connected, severity unknown.
    fn default() -> Self {
        Self {
            connected: false,
            severity: AlarmLevel::Invalid,
        }
    }
}

/// Generation of the tracked address set.
///
/// Bumped every time the store is cleared. Events carry the generation their
/// subscription was created in; events from an older generation are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(u64);

impl Epoch {
    #[must_use]
    pub(crate) const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Raw generation counter.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Channel state keyed by address.
#[derive(Debug, Default)]
pub struct AlarmStateStore {
    channels: HashMap<Address, ChannelState>,
    epoch: Epoch,
}

impl AlarmStateStore {
    /// Creates an empty store at the initial generation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation.
    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Start tracking `address` with the initial channel state.
    ///
    /// Returns false if the generation is stale or the address is already tracked.
    pub fn track(&mut self, epoch: Epoch, address: &Address) -> bool {
        if epoch != self.epoch || self.channels.contains_key(address) {
            return false;
        }
        self.channels.insert(address.clone(), ChannelState::default());
        true
    }

    /// Apply `f` to the state of `address`.
    ///
    /// Returns false, without touching anything, when the address is not tracked
    /// or the event belongs to an older generation.
    fn update(&mut self, epoch: Epoch, address: &Address, f: impl FnOnce(&mut ChannelState)) -> bool {
        if epoch != self.epoch {
            return false;
        }
        match self.channels.get_mut(address) {
            Some(state) => {
                f(state);
                true
            }
            None => false,
        }
    }

    /// Set the connection flag of `address`.
    pub fn set_connected(&mut self, epoch: Epoch, address: &Address, connected: bool) -> bool {
        self.update(epoch, address, |s| s.connected = connected)
    }

    /// Set the severity of `address`.
    pub fn set_severity(&mut self, epoch: Epoch, address: &Address, severity: AlarmLevel) -> bool {
        self.update(epoch, address, |s| s.severity = severity)
    }

    /// Forget every address and move to a new generation.
    pub fn clear(&mut self) -> Epoch {
        self.channels.clear();
        self.epoch = self.epoch.next();
        self.epoch
    }

    /// State of one address.
    #[must_use]
    pub fn get(&self, address: &Address) -> Option<ChannelState> {
        self.channels.get(address).copied()
    }

    /// Number of tracked addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Worst-case level over all tracked addresses.
    #[must_use]
    pub fn summary(&self) -> AlarmLevel {
        compute_summary(self.channels.values())
    }

    /// Ordered copy of the tracked states.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<Address, ChannelState> {
        self.channels.iter().map(|(a, s)| (a.clone(), *s)).collect()
    }
}
