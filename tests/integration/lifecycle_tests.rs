//! Whole wake cycles through the lifecycle controller.

use sensornode::app::events::AppEvent;
use sensornode::app::ports::{ResetReason, Response};
use sensornode::app::service::{LifecycleController, Terminal};
use sensornode::config::{ChipId, GLOBAL_CONFIG_PATH, LOCAL_CONFIG_PATH, UNCONFIGURED_SLEEP_SECS};
use sensornode::fsm::LifecycleState;
use sensornode::update::{ConfigName, FirmwareOutcome, UpdateOutcome};

use super::mock_hw::{GLOBAL_DOC, MOCK_AP, MemStorage, MockWifi, Rig, mock_registry};

fn chip() -> ChipId {
    ChipId::try_from("0x00aabbcc").unwrap()
}

fn states(rig: &Rig) -> Vec<(LifecycleState, LifecycleState)> {
    rig.events
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

// ── First boot: nothing stored, power-on ─────────────────────

#[test]
fn first_boot_refreshes_everything_then_reboots() {
    let mut rig = Rig::new(
        ResetReason::PowerOn,
        MemStorage::default(),
        MockWifi::reachable(),
    );
    let served_global = GLOBAL_DOC.replace(
        "https://ctrl.example.net",
        "https://ctrl.example.net/some/path",
    );
    let local = r#"{"config_version": 2, "sleep_time_s": 300, "sensors": []}"#;
    let image = vec![0xA5u8; 5000];
    rig.transport = std::mem::take(&mut rig.transport)
        .route(
            "https://example.com/api/v1/global_config",
            Response::new(200, served_global.as_bytes()),
        )
        .route(
            "https://ctrl.example.net/api/v1/local_config",
            Response::new(200, local.as_bytes()),
        )
        .route(
            "https://ctrl.example.net/api/v1/firmware",
            Response::new(200, image).with_header("X-firmware-version", "99.0.0"),
        );

    let registry = mock_registry();
    let mut ctl = LifecycleController::new(chip(), &registry);
    let terminal = ctl.run(&mut rig.ports());

    assert_eq!(terminal, Terminal::Reboot);
    assert_eq!(
        states(&rig),
        vec![
            (LifecycleState::Boot, LifecycleState::GoingOnline),
            (LifecycleState::GoingOnline, LifecycleState::OnlineIdle),
            (LifecycleState::OnlineIdle, LifecycleState::OtaUpdating),
        ]
    );

    // Defaults drove the first fetch; the refreshed, normalised URL the rest.
    assert_eq!(
        rig.transport.urls(),
        vec![
            "https://example.com/api/v1/global_config",
            "https://ctrl.example.net/api/v1/local_config",
            "https://ctrl.example.net/api/v1/firmware",
        ]
    );
    assert_eq!(rig.wifi.begins[0].0, "NO SSID");
    assert_eq!(rig.storage.text(GLOBAL_CONFIG_PATH), Some(served_global));
    assert_eq!(rig.storage.text(LOCAL_CONFIG_PATH).as_deref(), Some(local));
    assert_eq!(ctl.config().global().ctrl_url, "https://ctrl.example.net");

    assert_eq!(rig.firmware.begun, Some(5000));
    assert_eq!(rig.firmware.chunks, vec![4096, 904]);
    assert!(rig.firmware.finalized);

    assert!(rig.events.contains(|e| *e
        == AppEvent::ConfigRefreshed {
            name: ConfigName::Local,
            outcome: UpdateOutcome::Updated
        }));
    assert!(rig.events.contains(|e| *e
        == AppEvent::FirmwareChecked(Some(FirmwareOutcome::Applied { bytes: 5000 }))));
    assert_eq!(rig.events.events.last(), Some(&AppEvent::Rebooting));

    // No sampling and no telemetry on an update cycle.
    assert!(rig.telemetry.opened.is_none());
    assert!(rig.telemetry.points.is_empty());
}

#[test]
fn update_cycle_reboots_even_when_server_has_nothing() {
    let storage = MemStorage::default().with(GLOBAL_CONFIG_PATH, GLOBAL_DOC);
    let mut rig = Rig::new(ResetReason::External, storage, MockWifi::reachable());

    let registry = mock_registry();
    let mut ctl = LifecycleController::new(chip(), &registry);
    assert_eq!(ctl.run(&mut rig.ports()), Terminal::Reboot);

    assert_eq!(rig.transport.requests.len(), 3);
    assert!(rig.events.contains(|e| *e
        == AppEvent::ConfigRefreshed {
            name: ConfigName::Global,
            outcome: UpdateOutcome::NotModified
        }));
    assert!(rig
        .events
        .contains(|e| *e == AppEvent::FirmwareChecked(Some(FirmwareOutcome::NoUpdate))));
    assert!(rig.firmware.begun.is_none());
    assert!(rig.storage.writes.is_empty());
}

// ── Quiet cycle: nothing to report ───────────────────────────

#[test]
fn quiet_round_sleeps_without_connectivity() {
    let local = r#"{
        "device_name": "bench",
        "sleep_time_s": 120,
        "config_version": 1,
        "sensors": [
            {"type": "mock", "name": "a", "warmup_ticks": 2},
            {"type": "thermocouple", "name": "unknown"},
            {"type": "MOCK", "name": "b"}
        ]
    }"#;
    let storage = MemStorage::default()
        .with(GLOBAL_CONFIG_PATH, GLOBAL_DOC)
        .with(LOCAL_CONFIG_PATH, local);
    let mut rig = Rig::new(ResetReason::DeepSleepWake, storage, MockWifi::reachable());

    let registry = mock_registry();
    let mut ctl = LifecycleController::new(chip(), &registry);
    let terminal = ctl.run(&mut rig.ports());

    assert_eq!(terminal, Terminal::Sleep { secs: 120 });
    assert!(rig.events.contains(|e| *e
        == AppEvent::SensorsInstantiated {
            requested: 3,
            created: 2
        }));
    assert_eq!(ctl.sampler().len(), 2);
    // Two warm-up ticks plus the completing one.
    assert_eq!(ctl.sampler().ticks(), 3);
    assert!(!ctl.context().upload_requested);

    assert!(rig.wifi.begins.is_empty());
    assert!(rig.transport.requests.is_empty());
    assert!(rig.power.retained_writes.is_empty());
    assert_eq!(
        states(&rig),
        vec![
            (LifecycleState::Boot, LifecycleState::Sampling),
            (LifecycleState::Sampling, LifecycleState::SleepPending),
        ]
    );
}

// ── Upload cycle ─────────────────────────────────────────────

#[test]
fn upload_publishes_every_sensor_and_survives_flush_failure() {
    let local = r#"{
        "sleep_time_s": 900,
        "sensors": [
            {"type": "mock", "name": "hot", "report": 1, "value": 31.5},
            {"type": "mock", "name": "cold", "value": 4.0}
        ]
    }"#;
    let storage = MemStorage::default()
        .with(GLOBAL_CONFIG_PATH, GLOBAL_DOC)
        .with(LOCAL_CONFIG_PATH, local);
    let mut rig = Rig::new(ResetReason::DeepSleepWake, storage, MockWifi::reachable());
    rig.telemetry.fail_flush = true;

    let registry = mock_registry();
    let mut ctl = LifecycleController::new(chip(), &registry);
    let terminal = ctl.run(&mut rig.ports());

    assert_eq!(terminal, Terminal::Sleep { secs: 900 });
    assert_eq!(
        rig.telemetry.opened,
        Some(("greenhouse".to_owned(), 2))
    );
    assert_eq!(rig.telemetry.points.len(), 2);
    assert_eq!(rig.telemetry.flushes, 1);
    assert!(rig.events.contains(|e| *e
        == AppEvent::Published {
            points: 2,
            flushed: false
        }));

    let first = &rig.telemetry.points[0];
    assert!(first.tags.contains(&("device".to_owned(), "0x00aabbcc".to_owned())));
    assert!(first.tags.contains(&("name".to_owned(), "hot".to_owned())));
    assert_eq!(first.timestamp, Some(1_750_000_000));

    assert_eq!(
        states(&rig),
        vec![
            (LifecycleState::Boot, LifecycleState::Sampling),
            (LifecycleState::Sampling, LifecycleState::GoingOnline),
            (LifecycleState::GoingOnline, LifecycleState::OnlineIdle),
            (LifecycleState::OnlineIdle, LifecycleState::Sampling),
            (LifecycleState::Sampling, LifecycleState::SleepPending),
        ]
    );

    // Association parameters carried into the next wake.
    assert_eq!(rig.wifi.shutdowns, 1);
    assert_eq!(rig.power.retained_writes, vec![MOCK_AP]);
}

#[test]
fn missing_local_document_forces_update_on_warm_wake() {
    let storage = MemStorage::default().with(GLOBAL_CONFIG_PATH, GLOBAL_DOC);
    let mut rig = Rig::new(ResetReason::DeepSleepWake, storage, MockWifi::reachable());

    let registry = mock_registry();
    let mut ctl = LifecycleController::new(chip(), &registry);
    assert_eq!(ctl.run(&mut rig.ports()), Terminal::Reboot);
    assert!(ctl.context().needs_update);
    assert_eq!(ctl.sleep_secs(), UNCONFIGURED_SLEEP_SECS);
}

// ── Global document missing but local present ────────────────

const ONE_SENSOR: &str = r#"{"sleep_time_s": 300, "sensors": [{"type": "mock", "name": "a"}]}"#;

#[test]
fn missing_global_document_still_samples_and_sleeps() {
    let mut storage = MemStorage::default().with(LOCAL_CONFIG_PATH, ONE_SENSOR);

    let registry = mock_registry();
    for _ in 0..3 {
        let mut rig = Rig::new(ResetReason::DeepSleepWake, storage, MockWifi::reachable());
        let mut ctl = LifecycleController::new(chip(), &registry);

        assert_eq!(ctl.run(&mut rig.ports()), Terminal::Sleep { secs: 300 });
        assert!(!ctl.context().needs_update);
        assert_eq!(ctl.sampler().len(), 1);
        assert!(ctl.sampler().ticks() > 0);
        assert!(rig.wifi.begins.is_empty());
        assert!(rig.transport.requests.is_empty());
        storage = rig.storage;
    }
}

#[test]
fn unreadable_global_document_falls_back_to_defaults() {
    let storage = MemStorage::default()
        .with(GLOBAL_CONFIG_PATH, "{ not json")
        .with(LOCAL_CONFIG_PATH, ONE_SENSOR);
    let mut rig = Rig::new(ResetReason::DeepSleepWake, storage, MockWifi::reachable());

    let registry = mock_registry();
    let mut ctl = LifecycleController::new(chip(), &registry);
    assert_eq!(ctl.run(&mut rig.ports()), Terminal::Sleep { secs: 300 });
    assert!(rig.events.contains(|e| matches!(
        e,
        AppEvent::Booted {
            needs_update: false,
            ..
        }
    )));
    assert_eq!(
        states(&rig),
        vec![
            (LifecycleState::Boot, LifecycleState::Sampling),
            (LifecycleState::Sampling, LifecycleState::SleepPending),
        ]
    );
}

#[test]
fn power_on_with_missing_global_document_goes_online() {
    let storage = MemStorage::default().with(LOCAL_CONFIG_PATH, ONE_SENSOR);
    let mut rig = Rig::new(ResetReason::PowerOn, storage, MockWifi::reachable());

    let registry = mock_registry();
    let mut ctl = LifecycleController::new(chip(), &registry);
    assert_eq!(ctl.run(&mut rig.ports()), Terminal::Reboot);
    assert!(ctl.context().needs_update);
    assert_eq!(rig.wifi.begins.len(), 1);
}
