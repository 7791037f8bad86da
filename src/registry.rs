//! Channel registry.
//!
//! Owns the live transport subscriptions, keyed by address, and remembers which
//! devices selected which addresses. An address shared by several devices is
//! subscribed once and owned by all of them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::aggregate::aggregator::ChannelSink;
use crate::aggregate::Aggregator;
use crate::error::ConfigurationError;
use crate::filter;
use crate::level::ImportanceLevel;
use crate::signal::{Address, Device};
use crate::transport::{SubscriptionHandle, Transport};

#[derive(Debug)]
struct ChannelEntry {
    /// `None` when the transport refused the subscription.
    handle: Option<SubscriptionHandle>,
    owners: BTreeSet<String>,
}

/// Outcome of releasing every subscription.
#[allow(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    pub released: usize,
    pub failed: usize,
}

/// Per-device subscription bookkeeping.
pub struct ChannelRegistry {
    transport: Arc<dyn Transport>,
    devices: BTreeMap<String, Vec<Address>>,
    entries: HashMap<Address, ChannelEntry>,
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("devices", &self.devices)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl ChannelRegistry {
    /// Creates an empty registry subscribing through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            devices: BTreeMap::new(),
            entries: HashMap::new(),
        }
    }

    /// Filter `device`'s signals at `level` and subscribe every selected address.
    ///
    /// Addresses are tracked by `aggregator` before their subscription is
    /// requested, so a refused subscription leaves the address tracked as
    /// disconnected. Returns the addresses selected for the device.
    pub fn add_device(
        &mut self,
        device: &Device,
        level: ImportanceLevel,
        aggregator: &Arc<Aggregator>,
    ) -> Result<Vec<Address>, ConfigurationError> {
        device.validate()?;
        if self.devices.contains_key(&device.name) {
            return Err(ConfigurationError::DuplicateDevice {
                name: device.name.clone(),
            });
        }

        let addresses = filter::selected_addresses(level, &device.signals);
        let fresh: Vec<Address> = addresses
            .iter()
            .filter(|a| !self.entries.contains_key(*a))
            .cloned()
            .collect();

        let epoch = aggregator.epoch();
        aggregator.track(epoch, &fresh);

        for address in &addresses {
            self.entries
                .entry(address.clone())
                .or_insert_with(|| ChannelEntry {
                    handle: None,
                    owners: BTreeSet::new(),
                })
                .owners
                .insert(device.name.clone());
        }

        for address in &fresh {
            let sink = Arc::new(ChannelSink::new(address.clone(), epoch, Arc::downgrade(aggregator)));
            match self.transport.subscribe(address, sink) {
                Ok(handle) => {
                    if let Some(entry) = self.entries.get_mut(address) {
                        entry.handle = Some(handle);
                    }
                }
                Err(e) => {
                    warn!(
                        device = %device.name,
                        address = %address,
                        error = %e,
                        "subscription failed; channel stays disconnected"
                    );
                }
            }
        }

        debug!(
            device = %device.name,
            level = %level,
            selected = addresses.len(),
            subscribed = fresh.len(),
            "device added to alarm summary"
        );
        self.devices.insert(device.name.clone(), addresses.clone());
        Ok(addresses)
    }

    /// Release every subscription and forget every device.
    ///
    /// A failing release is logged and does not stop the remaining ones.
    pub fn remove_all(&mut self) -> TeardownReport {
        let entries = std::mem::take(&mut self.entries);
        self.devices.clear();

        let mut report = TeardownReport::default();
        for (address, entry) in entries {
            let Some(handle) = entry.handle else {
                continue;
            };
            match self.transport.unsubscribe(handle) {
                Ok(()) => report.released += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(address = %address, error = %e, "failed to release subscription; continuing teardown");
                }
            }
        }

        debug!(released = report.released, failed = report.failed, "released alarm subscriptions");
        report
    }

    /// Request subscriptions again for addresses the transport previously refused.
    ///
    /// Returns how many succeeded this time.
    pub fn retry_failed(&mut self, aggregator: &Arc<Aggregator>) -> usize {
        let epoch = aggregator.epoch();
        let mut recovered = 0;
        for (address, entry) in self.entries.iter_mut().filter(|(_, e)| e.handle.is_none()) {
            let sink = Arc::new(ChannelSink::new(address.clone(), epoch, Arc::downgrade(aggregator)));
            match self.transport.subscribe(address, sink) {
                Ok(handle) => {
                    entry.handle = Some(handle);
                    recovered += 1;
                }
                Err(e) => {
                    debug!(address = %address, error = %e, "subscription retry failed");
                }
            }
        }
        recovered
    }

    /// Registered device names, sorted.
    #[must_use]
    pub fn device_names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    /// Addresses selected for `name`.
    #[must_use]
    pub fn device_addresses(&self, name: &str) -> Option<&[Address]> {
        self.devices.get(name).map(Vec::as_slice)
    }

    /// Every registered address, sorted.
    #[must_use]
    pub fn addresses(&self) -> Vec<Address> {
        let mut out: Vec<Address> = self.entries.keys().cloned().collect();
        out.sort();
        out
    }

    /// Registered addresses without a live subscription, sorted.
    #[must_use]
    pub fn failed_addresses(&self) -> Vec<Address> {
        let mut out: Vec<Address> = self
            .entries
            .iter()
            .filter(|(_, e)| e.handle.is_none())
            .map(|(a, _)| a.clone())
            .collect();
        out.sort();
        out
    }

    /// Devices that selected `address`.
    #[must_use]
    pub fn owners_of(&self, address: &Address) -> Vec<String> {
        self.entries
            .get(address)
            .map(|e| e.owners.iter().cloned().collect())
            .unwrap_or_default()
    }
}
