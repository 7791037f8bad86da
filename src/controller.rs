//! Reconfiguration controller and engine facade.
//!
//! [`AlarmSummary`] is the single entry point for configuration changes. Every
//! change is serialized by the control lock: callers on other threads queue
//! behind an in-flight reconfiguration, while a call re-entering from the thread
//! already performing one (for example from inside a transport `subscribe`) is
//! rejected instead of interleaving with it.
//!
//! Importance changes and device removal rebuild the aggregation:
//! release every subscription, clear the state store (publishing
//! `Disconnected` if that is a transition), then re-add every known device
//! under the current importance level. Adding a device only subscribes the new
//! device's addresses.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, warn};

use crate::aggregate::{AggregationSnapshot, Aggregator, NotificationChannel, ObserverId, SummaryObserver, SummaryStream};
use crate::config::AlarmSummaryConfig;
use crate::directory::DeviceDirectory;
use crate::error::{lock_err, AlarmResult, ConfigurationError};
use crate::level::{AlarmLevel, ImportanceLevel};
use crate::registry::{ChannelRegistry, TeardownReport};
use crate::signal::{Address, Device};
use crate::transport::Transport;

#[derive(Debug)]
struct ControlState {
    importance: ImportanceLevel,
    /// Known devices in the order they were added.
    devices: Vec<Device>,
    registry: ChannelRegistry,
}

struct ControlGuard<'a> {
    owner: &'a Mutex<Option<ThreadId>>,
    state: MutexGuard<'a, ControlState>,
}

impl Deref for ControlGuard<'_> {
    type Target = ControlState;

    fn deref(&self) -> &ControlState {
        &self.state
    }
}

impl DerefMut for ControlGuard<'_> {
    fn deref_mut(&mut self) -> &mut ControlState {
        &mut self.state
    }
}

impl Drop for ControlGuard<'_> {
    fn drop(&mut self) {
        // Runs before `state` is released.
        if let Ok(mut owner) = self.owner.lock() {
            *owner = None;
        }
    }
}

/// Alarm aggregation engine for a set of devices.
#[derive(Debug)]
pub struct AlarmSummary {
    aggregator: Arc<Aggregator>,
    control: Mutex<ControlState>,
    owner: Mutex<Option<ThreadId>>,
}

impl AlarmSummary {
    /// Creates an engine with no devices, publishing `Disconnected`.
    pub fn new(config: AlarmSummaryConfig, transport: Arc<dyn Transport>) -> AlarmResult<Self> {
        let notifier = NotificationChannel::new(config.notification)?;
        Ok(Self {
            aggregator: Arc::new(Aggregator::new(notifier)),
            control: Mutex::new(ControlState {
                importance: config.importance,
                devices: Vec::new(),
                registry: ChannelRegistry::new(transport),
            }),
            owner: Mutex::new(None),
        })
    }

    fn enter(&self) -> AlarmResult<ControlGuard<'_>> {
        let me = thread::current().id();
        if *self.owner.lock().map_err(|_| lock_err("control owner"))? == Some(me) {
            return Err(ConfigurationError::ReconfigurationInProgress.into());
        }

        let state = self.control.lock().map_err(|_| lock_err("control"))?;
        *self.owner.lock().map_err(|_| lock_err("control owner"))? = Some(me);
        Ok(ControlGuard {
            owner: &self.owner,
            state,
        })
    }

    fn inspect(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rebuild(&self, state: &mut ControlState) -> TeardownReport {
        let report = state.registry.remove_all();
        let epoch = self.aggregator.reset();

        for device in &state.devices {
            if let Err(e) = state.registry.add_device(device, state.importance, &self.aggregator) {
                warn!(device = %device.name, error = %e, "device skipped while rebuilding alarm summary");
            }
        }

        debug!(
            importance = %state.importance,
            devices = state.devices.len(),
            epoch = epoch.get(),
            released = report.released,
            release_failures = report.failed,
            "alarm summary rebuilt"
        );
        report
    }

    /// Add a device to the aggregation under the current importance level.
    ///
    /// Rejects a name that is already registered; remove it first to replace it.
    pub fn add_device(&self, device: Device) -> AlarmResult<()> {
        let mut state = self.enter()?;
        if state.devices.iter().any(|d| d.name == device.name) {
            return Err(ConfigurationError::DuplicateDevice { name: device.name }.into());
        }

        let importance = state.importance;
        state.registry.add_device(&device, importance, &self.aggregator)?;
        state.devices.push(device);
        Ok(())
    }

    /// Resolve `name` through `directory` and add the device.
    pub fn add_device_from(&self, directory: &dyn DeviceDirectory, name: &str) -> AlarmResult<()> {
        let device = directory
            .find_device(name)
            .ok_or_else(|| ConfigurationError::UnknownDevice { name: name.to_string() })?;
        self.add_device(device)
    }

    /// Remove a device and rebuild the aggregation from the remaining ones.
    pub fn remove_device(&self, name: &str) -> AlarmResult<Device> {
        let mut state = self.enter()?;
        let idx = state
            .devices
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| ConfigurationError::UnknownDevice { name: name.to_string() })?;

        let removed = state.devices.remove(idx);
        self.rebuild(&mut state);
        Ok(removed)
    }

    /// Change the importance level and rebuild the aggregation.
    ///
    /// Setting the current level again is a no-op.
    pub fn set_importance_level(&self, level: ImportanceLevel) -> AlarmResult<()> {
        let mut state = self.enter()?;
        if state.importance == level {
            return Ok(());
        }
        state.importance = level;
        self.rebuild(&mut state);
        Ok(())
    }

    /// Rebuild the aggregation with the current devices and importance level.
    pub fn reconfigure(&self) -> AlarmResult<TeardownReport> {
        let mut state = self.enter()?;
        Ok(self.rebuild(&mut state))
    }

    /// Remove every device, releasing all subscriptions.
    pub fn clear(&self) -> AlarmResult<TeardownReport> {
        let mut state = self.enter()?;
        state.devices.clear();
        Ok(self.rebuild(&mut state))
    }

    /// Ask the transport again for subscriptions it previously refused.
    pub fn retry_failed_subscriptions(&self) -> AlarmResult<usize> {
        let mut state = self.enter()?;
        Ok(state.registry.retry_failed(&self.aggregator))
    }

    /// Last published summary level.
    #[must_use]
    pub fn summary(&self) -> AlarmLevel {
        self.aggregator.summary()
    }

    /// Tracked channel states with the summary computed from them.
    #[must_use]
    pub fn snapshot(&self) -> AggregationSnapshot {
        self.aggregator.snapshot()
    }

    /// Current importance level.
    #[must_use]
    pub fn importance_level(&self) -> ImportanceLevel {
        self.inspect().importance
    }

    /// Names of the known devices, in the order they were added.
    #[must_use]
    pub fn device_names(&self) -> Vec<String> {
        self.inspect().devices.iter().map(|d| d.name.clone()).collect()
    }

    /// Every address taking part in the summary, sorted.
    #[must_use]
    pub fn tracked_addresses(&self) -> Vec<Address> {
        self.inspect().registry.addresses()
    }

    /// Addresses selected for device `name` under the current importance level.
    #[must_use]
    pub fn device_addresses(&self, name: &str) -> Option<Vec<Address>> {
        self.inspect().registry.device_addresses(name).map(<[Address]>::to_vec)
    }

    /// Tracked addresses the transport refused to subscribe, sorted.
    #[must_use]
    pub fn failed_addresses(&self) -> Vec<Address> {
        self.inspect().registry.failed_addresses()
    }

    /// Stream of every transition published after this call returns.
    pub fn subscribe(&self) -> AlarmResult<SummaryStream> {
        self.aggregator.notifier().subscribe()
    }

    /// Register an observer for every transition published after this call returns.
    pub fn add_observer(&self, observer: Arc<dyn SummaryObserver>) -> AlarmResult<ObserverId> {
        self.aggregator.notifier().add_observer(observer)
    }

    /// Unregister an observer. Returns false if it was not registered.
    ///
    /// Safe to call from inside an observer callback.
    #[must_use]
    pub fn remove_observer(&self, observer_id: ObserverId) -> bool {
        self.aggregator.notifier().remove_observer(observer_id)
    }

    /// Transitions dropped because a stream buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.aggregator.notifier().dropped_events()
    }
}

impl Drop for AlarmSummary {
    fn drop(&mut self) {
        let state = self.control.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.registry.remove_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;
    use std::time::Duration;

    use crate::directory::InMemoryDirectory;
    use crate::error::{AlarmError, SubscriptionError};
    use crate::signal::ImportanceTag;
    use crate::transport::{ChannelEventSink, InMemoryTransport, SubscriptionHandle};

    fn engine(transport: &Arc<InMemoryTransport>) -> AlarmSummary {
        AlarmSummary::new(AlarmSummaryConfig::default(), Arc::clone(transport) as Arc<dyn Transport>).unwrap()
    }

    fn stage() -> Device {
        Device::new("stage")
            .with_signal("x", "ca://STAGE:X", ImportanceTag::Hinted)
            .with_signal("y", "ca://STAGE:Y", ImportanceTag::Normal)
            .with_signal("limits", "ca://STAGE:LIM", ImportanceTag::Config)
    }

    #[test]
    fn duplicate_add_leaves_state_unchanged() {
        let transport = Arc::new(InMemoryTransport::new());
        let engine = engine(&transport);
        engine.add_device(stage()).unwrap();

        let err = engine.add_device(stage()).unwrap_err();
        assert!(matches!(
            err,
            AlarmError::Configuration(ConfigurationError::DuplicateDevice { .. })
        ));
        assert_eq!(engine.device_names(), vec!["stage".to_string()]);
        assert_eq!(transport.active_subscriptions(), 1);
    }

    #[test]
    fn remove_unknown_device_is_rejected() {
        let transport = Arc::new(InMemoryTransport::new());
        let engine = engine(&transport);
        let err = engine.remove_device("ghost").unwrap_err();
        assert!(matches!(
            err,
            AlarmError::Configuration(ConfigurationError::UnknownDevice { .. })
        ));
    }

    #[test]
    fn importance_change_resubscribes_with_new_filter() {
        let transport = Arc::new(InMemoryTransport::new());
        let engine = engine(&transport);
        engine.add_device(stage()).unwrap();
        assert_eq!(engine.tracked_addresses().len(), 1);

        engine.set_importance_level(ImportanceLevel::Config).unwrap();
        assert_eq!(engine.importance_level(), ImportanceLevel::Config);
        assert_eq!(engine.tracked_addresses().len(), 3);
        assert_eq!(transport.active_subscriptions(), 3);

        engine.set_importance_level(ImportanceLevel::Normal).unwrap();
        assert_eq!(
            engine.tracked_addresses(),
            vec![Address::new("ca://STAGE:X"), Address::new("ca://STAGE:Y")]
        );
        assert_eq!(transport.active_subscriptions(), 2);
        assert_eq!(
            engine.device_addresses("stage"),
            Some(vec![Address::new("ca://STAGE:X"), Address::new("ca://STAGE:Y")])
        );
        assert_eq!(engine.device_addresses("mirror"), None);
    }

    #[test]
    fn add_device_from_directory() {
        let transport = Arc::new(InMemoryTransport::new());
        let engine = engine(&transport);
        let directory = InMemoryDirectory::new();
        directory.insert(stage());

        engine.add_device_from(&directory, "stage").unwrap();
        assert_eq!(engine.device_names(), vec!["stage".to_string()]);

        let err = engine.add_device_from(&directory, "mirror").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn clear_and_drop_release_subscriptions() {
        let transport = Arc::new(InMemoryTransport::new());
        let engine = engine(&transport);
        engine.add_device(stage()).unwrap();

        let report = engine.clear().unwrap();
        assert_eq!(report, TeardownReport { released: 1, failed: 0 });
        assert!(engine.device_names().is_empty());
        assert_eq!(engine.summary(), AlarmLevel::Disconnected);

        engine.add_device(stage()).unwrap();
        assert_eq!(transport.active_subscriptions(), 1);
        drop(engine);
        assert_eq!(transport.active_subscriptions(), 0);
    }

    /// Transport that tries to reconfigure the engine from inside `subscribe`.
    struct ReentrantTransport {
        inner: InMemoryTransport,
        engine: OnceLock<Arc<AlarmSummary>>,
        outcome: Mutex<Option<AlarmResult<()>>>,
    }

    impl Transport for ReentrantTransport {
        fn subscribe(
            &self,
            address: &Address,
            sink: Arc<dyn ChannelEventSink>,
        ) -> Result<SubscriptionHandle, SubscriptionError> {
            if let Some(engine) = self.engine.get() {
                let result = engine.set_importance_level(ImportanceLevel::Omitted);
                *self.outcome.lock().unwrap() = Some(result);
            }
            self.inner.subscribe(address, sink)
        }

        fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), SubscriptionError> {
            self.inner.unsubscribe(handle)
        }
    }

    #[test]
    fn same_thread_reentry_is_rejected() {
        let transport = Arc::new(ReentrantTransport {
            inner: InMemoryTransport::new(),
            engine: OnceLock::new(),
            outcome: Mutex::new(None),
        });
        let engine = Arc::new(
            AlarmSummary::new(AlarmSummaryConfig::default(), Arc::clone(&transport) as Arc<dyn Transport>).unwrap(),
        );
        let _ = transport.engine.set(Arc::clone(&engine));

        engine.add_device(stage()).unwrap();

        let outcome = transport.outcome.lock().unwrap().take().unwrap();
        assert!(matches!(
            outcome,
            Err(AlarmError::Configuration(ConfigurationError::ReconfigurationInProgress))
        ));
        assert_eq!(engine.importance_level(), ImportanceLevel::Hinted);
        assert_eq!(transport.inner.active_subscriptions(), 1);
    }

    #[test]
    fn concurrent_reconfigurations_are_serialized() {
        let transport = Arc::new(InMemoryTransport::new());
        let engine = Arc::new(engine(&transport));
        engine.add_device(stage()).unwrap();
        engine
            .add_device(Device::new("mirror").with_signal("pitch", "ca://MR:PITCH", ImportanceTag::Hinted))
            .unwrap();

        let handles: Vec<_> = ImportanceLevel::ALL
            .iter()
            .cycle()
            .take(16)
            .map(|level| {
                let engine = Arc::clone(&engine);
                let level = *level;
                thread::spawn(move || engine.set_importance_level(level))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        // Exactly one live subscription per tracked address, nothing orphaned.
        let tracked = engine.tracked_addresses();
        assert_eq!(transport.active_subscriptions(), tracked.len());
        for address in &tracked {
            assert_eq!(transport.subscriber_count(address), 1);
        }
        assert_eq!(engine.snapshot().channels.len(), tracked.len());
    }

    #[test]
    fn observers_may_reenter_the_engine() {
        let transport = Arc::new(InMemoryTransport::new());
        let engine = Arc::new(engine(&transport));
        engine.add_device(stage()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let weak = Arc::downgrade(&engine);
        let sink = Arc::clone(&seen);
        engine
            .add_observer(Arc::new(move |level: AlarmLevel| {
                // Reads the engine from the notification worker.
                if let Some(engine) = weak.upgrade() {
                    sink.lock().unwrap().push((level, engine.summary()));
                }
            }))
            .unwrap();
        let stream = engine.subscribe().unwrap();

        let x = Address::new("ca://STAGE:X");
        transport.publish_severity(&x, AlarmLevel::Minor);
        transport.publish_connection(&x, true);

        let change = stream.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(change.current, AlarmLevel::Minor);
        assert_eq!(*seen.lock().unwrap(), vec![(AlarmLevel::Minor, AlarmLevel::Minor)]);
    }

    #[test]
    fn observer_registers_streams_and_observers_from_its_callback() {
        let transport = Arc::new(InMemoryTransport::new());
        let engine = Arc::new(engine(&transport));
        engine.add_device(stage()).unwrap();

        let nested_levels = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = crossbeam_channel::bounded::<(SummaryStream, bool)>(1);
        let weak = Arc::downgrade(&engine);
        let recorder = Arc::clone(&nested_levels);
        let outer = engine
            .add_observer(Arc::new(move |level: AlarmLevel| {
                if level != AlarmLevel::NoAlarm {
                    return;
                }
                let Some(engine) = weak.upgrade() else {
                    return;
                };
                let stream = engine.subscribe().unwrap();
                let sink = Arc::clone(&recorder);
                let nested = engine
                    .add_observer(Arc::new(move |level: AlarmLevel| sink.lock().unwrap().push(level)))
                    .is_ok();
                let _ = done_tx.try_send((stream, nested));
            }))
            .unwrap();

        let x = Address::new("ca://STAGE:X");
        transport.publish_severity(&x, AlarmLevel::NoAlarm);
        transport.publish_connection(&x, true);

        let (stream, nested) = done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(nested);
        assert!(engine.remove_observer(outer));

        // The worker is still delivering after the nested registrations.
        transport.publish_severity(&x, AlarmLevel::Major);
        let change = stream.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!((change.previous, change.current), (AlarmLevel::NoAlarm, AlarmLevel::Major));
        assert_eq!(*nested_levels.lock().unwrap(), vec![AlarmLevel::Major]);
    }
}
