//! Association failures and the retained AP hint.

use sensornode::app::events::AppEvent;
use sensornode::app::ports::ResetReason;
use sensornode::app::service::{LifecycleController, Terminal, Tick};
use sensornode::config::{ASSOCIATION_POLLS, ChipId, GLOBAL_CONFIG_PATH, LOCAL_CONFIG_PATH};
use sensornode::fsm::LifecycleState;

use super::mock_hw::{GLOBAL_DOC, MOCK_AP, MemStorage, MockWifi, Rig, mock_registry};

const UPLOADING_LOCAL: &str =
    r#"{"sleep_time_s": 45, "sensors": [{"type": "mock", "report": 1}]}"#;

fn chip() -> ChipId {
    ChipId::try_from("0x00000001").unwrap()
}

fn configured() -> MemStorage {
    MemStorage::default()
        .with(GLOBAL_CONFIG_PATH, GLOBAL_DOC)
        .with(LOCAL_CONFIG_PATH, UPLOADING_LOCAL)
}

#[test]
fn failed_association_during_upload_sleeps_offline() {
    let mut rig = Rig::new(ResetReason::DeepSleepWake, configured(), MockWifi::unreachable());

    let registry = mock_registry();
    let mut ctl = LifecycleController::new(chip(), &registry);
    let terminal = ctl.run(&mut rig.ports());

    assert_eq!(terminal, Terminal::Sleep { secs: 45 });
    assert_eq!(rig.wifi.begins.len(), 1);
    assert_eq!(rig.wifi.polls.get(), ASSOCIATION_POLLS);
    assert!(rig.events.contains(|e| *e == AppEvent::AssociationFailed));
    assert!(rig.telemetry.points.is_empty());
    // Never online: nothing shut down, nothing retained.
    assert_eq!(rig.wifi.shutdowns, 0);
    assert!(rig.power.retained_writes.is_empty());
}

#[test]
fn failed_association_during_update_keeps_retrying() {
    let mut rig = Rig::new(ResetReason::PowerOn, configured(), MockWifi::unreachable());

    let registry = mock_registry();
    let mut ctl = LifecycleController::new(chip(), &registry);
    for _ in 0..6 {
        assert_eq!(ctl.tick(&mut rig.ports()), Tick::Continue);
    }
    assert_eq!(ctl.state(), LifecycleState::GoingOnline);
    assert_eq!(ctl.context().association_attempts, 5);
    assert_eq!(rig.wifi.begins.len(), 5);
    assert!(rig.transport.requests.is_empty());
}

#[test]
fn retained_hint_is_used_then_dropped_after_failure() {
    let mut rig = Rig::new(ResetReason::PowerOn, configured(), MockWifi::unreachable());
    rig.power.retained = Some(MOCK_AP);

    let registry = mock_registry();
    let mut ctl = LifecycleController::new(chip(), &registry);
    for _ in 0..3 {
        ctl.tick(&mut rig.ports());
    }
    assert_eq!(rig.wifi.begins.len(), 2);
    assert_eq!(rig.wifi.begins[0].1, Some(MOCK_AP));
    assert_eq!(rig.wifi.begins[1].1, None);
}

#[test]
fn warm_wake_connects_with_retained_hint() {
    let mut rig = Rig::new(ResetReason::DeepSleepWake, configured(), MockWifi::reachable());
    rig.power.retained = Some(MOCK_AP);

    let registry = mock_registry();
    let mut ctl = LifecycleController::new(chip(), &registry);
    assert_eq!(ctl.run(&mut rig.ports()), Terminal::Sleep { secs: 45 });
    assert_eq!(rig.wifi.begins, vec![("FieldNet".to_owned(), Some(MOCK_AP))]);
    assert!(rig.events.contains(|e| *e == AppEvent::Online { polls: 3 }));
    assert!(rig.clock.sync_started);
}
