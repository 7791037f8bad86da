use std::sync::Arc;
use std::thread;
use std::time::Duration;

use alarm_summary::{
    AlarmLevel, AlarmSummary, AlarmSummaryConfig, Address, Device, ImportanceLevel, ImportanceTag,
    InMemoryTransport, SummaryStream, Transport,
};

const WAIT: Duration = Duration::from_secs(2);

fn engine_with(transport: &Arc<InMemoryTransport>, importance: ImportanceLevel) -> AlarmSummary {
    let cfg = AlarmSummaryConfig::default().with_importance(importance);
    AlarmSummary::new(cfg, Arc::clone(transport) as Arc<dyn Transport>).unwrap()
}

fn levels(stream: &SummaryStream, n: usize) -> Vec<AlarmLevel> {
    (0..n).map(|_| stream.recv_timeout(WAIT).unwrap().current).collect()
}

fn report(transport: &InMemoryTransport, address: &Address, connected: bool, severity: AlarmLevel) {
    transport.publish_severity(address, severity);
    transport.publish_connection(address, connected);
}

#[test]
fn single_channel_emits_each_transition_once() {
    let transport = Arc::new(InMemoryTransport::new());
    let engine = engine_with(&transport, ImportanceLevel::Hinted);
    engine
        .add_device(Device::new("gauge").with_signal("pressure", "ca://GAUGE:P", ImportanceTag::Hinted))
        .unwrap();
    let stream = engine.subscribe().unwrap();
    let addr = Address::new("ca://GAUGE:P");

    transport.publish_severity(&addr, AlarmLevel::NoAlarm);
    transport.publish_connection(&addr, true);
    transport.publish_connection(&addr, true);
    transport.publish_severity(&addr, AlarmLevel::Major);
    transport.publish_severity(&addr, AlarmLevel::Major);
    transport.publish_connection(&addr, false);
    transport.publish_severity(&addr, AlarmLevel::Minor);

    assert_eq!(
        levels(&stream, 3),
        vec![AlarmLevel::NoAlarm, AlarmLevel::Major, AlarmLevel::Disconnected]
    );
    assert!(stream.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(engine.summary(), AlarmLevel::Disconnected);
}

#[test]
fn importance_switch_scenario() {
    let transport = Arc::new(InMemoryTransport::new());
    let engine = engine_with(&transport, ImportanceLevel::Hinted);
    engine
        .add_device(
            Device::new("D")
                .with_signal("A", "ca://D:A", ImportanceTag::Hinted)
                .with_signal("B", "ca://D:B", ImportanceTag::Normal),
        )
        .unwrap();
    let a = Address::new("ca://D:A");
    let b = Address::new("ca://D:B");

    assert_eq!(engine.tracked_addresses(), vec![a.clone()]);
    report(&transport, &a, true, AlarmLevel::Minor);
    assert_eq!(engine.summary(), AlarmLevel::Minor);

    engine.set_importance_level(ImportanceLevel::Normal).unwrap();
    assert_eq!(engine.tracked_addresses(), vec![a.clone(), b.clone()]);
    assert_eq!(engine.summary(), AlarmLevel::Disconnected);

    report(&transport, &a, true, AlarmLevel::Minor);
    transport.publish_severity(&b, AlarmLevel::Major);
    // B has not connected yet.
    assert_eq!(engine.summary(), AlarmLevel::Disconnected);

    transport.publish_connection(&b, true);
    assert_eq!(engine.summary(), AlarmLevel::Major);
}

#[test]
fn worst_case_across_devices() {
    let transport = Arc::new(InMemoryTransport::new());
    let engine = engine_with(&transport, ImportanceLevel::Config);
    engine
        .add_device(
            Device::new("m1")
                .with_signal("rbv", "ca://M1:RBV", ImportanceTag::Hinted)
                .with_signal("raw", "ca://M1:RAW", ImportanceTag::Omitted),
        )
        .unwrap();
    engine
        .add_device(
            Device::new("m2")
                .with_signal("rbv", "ca://M2:RBV", ImportanceTag::Hinted)
                .with_signal("vendor", "ca://M2:VENDOR", ImportanceTag::Unknown("vendor".to_string())),
        )
        .unwrap();

    let tracked = engine.tracked_addresses();
    assert_eq!(tracked.len(), 3, "omitted signal excluded, unknown tag included: {tracked:?}");
    assert_eq!(transport.subscriber_count(&Address::new("ca://M1:RAW")), 0);

    report(&transport, &Address::new("ca://M1:RBV"), true, AlarmLevel::NoAlarm);
    report(&transport, &Address::new("ca://M2:RBV"), true, AlarmLevel::Minor);
    assert_eq!(engine.summary(), AlarmLevel::Disconnected);

    report(&transport, &Address::new("ca://M2:VENDOR"), true, AlarmLevel::Invalid);
    assert_eq!(engine.summary(), AlarmLevel::Invalid);

    transport.publish_severity(&Address::new("ca://M2:VENDOR"), AlarmLevel::NoAlarm);
    assert_eq!(engine.summary(), AlarmLevel::Minor);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.summary, AlarmLevel::Minor);
    assert!(snapshot.channels.values().all(|s| s.connected));
}

#[test]
fn events_for_untracked_addresses_are_ignored() {
    let transport = Arc::new(InMemoryTransport::new());
    let engine = engine_with(&transport, ImportanceLevel::Hinted);
    engine
        .add_device(
            Device::new("m1")
                .with_signal("rbv", "ca://M1:RBV", ImportanceTag::Hinted)
                .with_signal("val", "ca://M1:VAL", ImportanceTag::Normal),
        )
        .unwrap();

    report(&transport, &Address::new("ca://M1:RBV"), true, AlarmLevel::NoAlarm);
    // Filtered out: never subscribed, so nothing is delivered.
    let delivered = transport.publish_connection(&Address::new("ca://M1:VAL"), false);
    assert_eq!(delivered, 0);
    assert_eq!(engine.summary(), AlarmLevel::NoAlarm);
    assert_eq!(engine.snapshot().channels.len(), 1);
}

#[test]
fn concurrent_events_publish_a_consistent_sequence() {
    let transport = Arc::new(InMemoryTransport::new());
    let engine = engine_with(&transport, ImportanceLevel::Hinted);
    let mut device = Device::new("array");
    for idx in 0..16 {
        device = device.with_signal(format!("ch{idx}"), format!("ca://ARRAY:CH{idx}"), ImportanceTag::Hinted);
    }
    engine.add_device(device).unwrap();
    let stream = engine.subscribe().unwrap();

    let handles: Vec<_> = (0..16)
        .map(|idx| {
            let transport = Arc::clone(&transport);
            thread::spawn(move || {
                let addr = Address::new(format!("ca://ARRAY:CH{idx}"));
                let severity = if idx == 7 { AlarmLevel::Major } else { AlarmLevel::NoAlarm };
                for _ in 0..50 {
                    transport.publish_severity(&addr, severity);
                    transport.publish_connection(&addr, true);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.summary(), AlarmLevel::Major);

    // Every published change continues from the previous one.
    let mut previous = AlarmLevel::Disconnected;
    let mut sequence = 0;
    while let Ok(change) = stream.recv_timeout(Duration::from_millis(200)) {
        assert_eq!(change.previous, previous);
        assert_ne!(change.previous, change.current);
        assert_eq!(change.sequence, sequence + 1);
        previous = change.current;
        sequence = change.sequence;
    }
    assert_eq!(previous, AlarmLevel::Major);
}
