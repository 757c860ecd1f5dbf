//! End-to-end scenarios against in-memory ports

use can_validation_core::{
    CanMessage, ConfigError, FrameworkConfig, HalManager, InteractionBroker, PreconditionCatalog,
    PreconditionEngine, SignalCatalog, SignalValue, ValidationError,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SIGNALS: &str = r#"
signals:
  Door:
    bus: body
    can_id: "0x100"
    payload:
      type: enum
      mapping: { OPEN: 1, CLOSED: 0 }
  DoorMirror:
    bus: body
    can_id: "0x101"
    payload:
      type: enum
      mapping: { OPEN: 1, CLOSED: 0 }
  Ignition:
    bus: powertrain
    can_id: "0x10"
    payload:
      type: enum
      mapping: { OFF: 0, ON: 1 }
  VehicleSpeed:
    bus: chassis
    can_id: 512
    payload:
      type: uint
  BrakeFault:
    bus: chassis
    frame_id: "0x2F0"
    payload:
      type: enum
      mapping: { NONE: 0, ACTIVE: 1 }
"#;

const PRECONDITIONS: &str = r#"
preconditions:
  DoorOpenAtStandstill:
    description: Ignition on, door open, vehicle not moving
    sla:
      timeout: 0.2
      polling_interval: 0.05
    steps:
      - action: set_signal
        target: Ignition
        value: "ON"
      - action: wait_for_signal
        target: Door
        value: OPEN
      - action: assert_signal_range
        target: VehicleSpeed
        value: { min: 0, max: 3 }
    rollback:
      - action: set_signal
        target: Ignition
        value: "OFF"
      - action: set_signal
        target: Door
        value: CLOSED
"#;

fn broker() -> Arc<InteractionBroker> {
    let catalog = SignalCatalog::from_yaml_str(SIGNALS).unwrap();
    let hal = HalManager::new("mock", Default::default()).unwrap();
    Arc::new(InteractionBroker::new(Arc::new(catalog), Arc::new(hal)))
}

fn inject(broker: &InteractionBroker, bus: &str, can_id: u32, byte: u8) {
    broker
        .hal()
        .simulated_port(bus)
        .unwrap()
        .inject_message(CanMessage::new(can_id, vec![byte]));
}

#[test]
fn test_door_round_trip() {
    let broker = broker();

    let result = broker.set_signal("Door", "OPEN").unwrap();
    assert!(result.success);

    let sent = broker.hal().simulated_port("body").unwrap().sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].can_id, 0x100);
    assert_eq!(sent[0].data, vec![0x01]);

    inject(&broker, "body", 0x100, 0x01);
    let value = broker.get_signal("Door", Duration::from_secs(1)).unwrap();
    assert_eq!(value, SignalValue::from("OPEN"));
}

#[test]
fn test_wait_times_out_after_deadline() {
    let broker = broker();

    let start = Instant::now();
    let err = broker
        .wait_for_signal("Door", "CLOSED", Some(Duration::from_millis(200)), Duration::from_millis(50))
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_sut_fault());
    assert!(elapsed >= Duration::from_millis(190), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "returned after {:?}", elapsed);
}

#[test]
fn test_wait_sees_late_frame() {
    let broker = broker();
    let port = broker.hal().simulated_port("body").unwrap();

    let injector = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        port.inject_message(CanMessage::new(0x100, vec![0x00]));
        port.inject_message(CanMessage::new(0x100, vec![0x01]));
    });

    broker
        .wait_for_signal("Door", "open", Some(Duration::from_secs(2)), Duration::from_millis(20))
        .unwrap();
    injector.join().unwrap();
}

#[test]
fn test_consistency_across_signals() {
    let broker = broker();
    let timeout = Duration::from_millis(200);

    inject(&broker, "body", 0x100, 1);
    inject(&broker, "body", 0x101, 1);
    broker.assert_consistent_signals(["Door", "DoorMirror"], timeout).unwrap();

    inject(&broker, "body", 0x100, 1);
    inject(&broker, "body", 0x101, 0);
    let err = broker
        .assert_consistent_signals(["Door", "DoorMirror"], timeout)
        .unwrap_err();
    assert!(err.is_sut_fault());
    assert!(err.to_string().contains("DoorMirror=CLOSED"));
}

#[test]
fn test_fault_indicators() {
    let broker = broker();
    let timeout = Duration::from_millis(200);

    inject(&broker, "chassis", 0x2F0, 0);
    broker.assert_no_faults(["BrakeFault"], timeout).unwrap();

    inject(&broker, "chassis", 0x2F0, 1);
    let err = broker.assert_no_faults(["BrakeFault"], timeout).unwrap_err();
    assert!(err.is_environment_fault());
    assert!(err.to_string().contains("ACTIVE"));
}

#[test]
fn test_precondition_applies_and_rolls_back() {
    let broker = broker();
    let catalog = PreconditionCatalog::from_yaml_str(PRECONDITIONS).unwrap();
    let engine = PreconditionEngine::new(Arc::new(catalog), Arc::clone(&broker));
    engine.validate().unwrap();

    // Door opens and the vehicle stands still: all steps pass
    inject(&broker, "body", 0x100, 1);
    inject(&broker, "chassis", 0x200, 0);
    engine.apply("DoorOpenAtStandstill").unwrap();
    assert!(broker.hal().simulated_port("body").unwrap().sent_messages().is_empty());

    // The vehicle moves: third step fails and both rollback steps run
    inject(&broker, "body", 0x100, 1);
    inject(&broker, "chassis", 0x200, 42);
    let err = engine.apply("DoorOpenAtStandstill").unwrap_err();
    assert!(err.is_environment_fault());
    assert!(err.to_string().contains("DoorOpenAtStandstill"));

    match &err {
        ValidationError::PreconditionFailed {
            step, rollback_failures, ..
        } => {
            assert_eq!(*step, 3);
            assert!(rollback_failures.is_empty());
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let ignition = broker.hal().simulated_port("powertrain").unwrap().sent_messages();
    let ignition: Vec<u8> = ignition.iter().map(|m| m.data[0]).collect();
    assert_eq!(ignition, vec![1, 1, 0]);

    let door = broker.hal().simulated_port("body").unwrap().sent_messages();
    assert_eq!(door.len(), 1);
    assert_eq!(door[0].data, vec![0]);
}

#[test]
fn test_unknown_precondition() {
    let broker = broker();
    let engine = PreconditionEngine::new(Arc::new(PreconditionCatalog::new()), broker);
    assert!(matches!(
        engine.apply("Nowhere"),
        Err(ValidationError::Config(ConfigError::PreconditionNotFound(_)))
    ));
}

#[test]
fn test_wiring_from_configuration_files() {
    let dir = tempfile::tempdir().unwrap();
    let framework = dir.path().join("framework.yaml");
    let signals = dir.path().join("signals.yaml");
    std::fs::write(&framework, "mode: sil\ntimeouts:\n  default_read: 0.5\n").unwrap();
    std::fs::write(&signals, SIGNALS).unwrap();

    let config = FrameworkConfig::from_path(&framework).unwrap();
    let hal = HalManager::from_config(&config).unwrap();
    let catalog = SignalCatalog::from_path(&signals).unwrap();
    let broker = InteractionBroker::new(Arc::new(catalog), Arc::new(hal));

    inject(&broker, "chassis", 0x200, 80);
    let timeout = config.timeout("default_read").unwrap();
    assert_eq!(timeout, Duration::from_millis(500));
    broker.assert_signal_in_range("VehicleSpeed", 50.0, 120.0, timeout).unwrap();
}
