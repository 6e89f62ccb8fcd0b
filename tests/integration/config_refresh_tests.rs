//! Configuration refresh against a routed control server.

use sensornode::app::ports::{ResetReason, Response};
use sensornode::app::service::{LifecycleController, Terminal};
use sensornode::config::{ChipId, GLOBAL_CONFIG_PATH, LOCAL_CONFIG_PATH};
use sensornode::update::{ConfigName, ConfigStore, UpdateOutcome};

use super::mock_hw::{GLOBAL_DOC, MemStorage, MockWifi, RoutedTransport, Rig, mock_registry};

const LOCAL_V5: &str = r#"{"config_version": 5, "sleep_time_s": 60, "sensors": []}"#;

fn chip() -> ChipId {
    ChipId::try_from("0x00c0ffee").unwrap()
}

fn store_with(storage: &MemStorage) -> ConfigStore {
    let mut store = ConfigStore::new(chip());
    store.load_global(storage);
    store.load_local(storage);
    store
}

#[test]
fn refresh_sends_identity_and_known_versions() {
    let mut storage = MemStorage::default()
        .with(GLOBAL_CONFIG_PATH, GLOBAL_DOC)
        .with(LOCAL_CONFIG_PATH, LOCAL_V5);
    let mut transport = RoutedTransport::default();
    let mut store = store_with(&storage);

    store
        .refresh(ConfigName::Global, &mut storage, &mut transport)
        .unwrap();
    store
        .refresh(ConfigName::Local, &mut storage, &mut transport)
        .unwrap();

    let global = &transport.requests[0];
    assert_eq!(global.url, "https://ctrl.example.net/api/v1/global_config");
    assert_eq!(global.header("User-Agent"), Some("sensornode-OTA"));
    assert_eq!(global.header("X-chip-id"), Some("0x00c0ffee"));
    assert_eq!(global.header("X-global-config-version"), Some("4"));
    assert_eq!(global.header("X-global-config-key"), Some("K3Y"));

    let local = &transport.requests[1];
    assert_eq!(local.header("X-config-version"), Some("5"));
    assert_eq!(local.header("X-global-config-key"), None);
}

#[test]
fn older_local_document_is_rejected_and_not_stored() {
    let mut storage = MemStorage::default()
        .with(GLOBAL_CONFIG_PATH, GLOBAL_DOC)
        .with(LOCAL_CONFIG_PATH, LOCAL_V5);
    let mut transport = RoutedTransport::default().route(
        "https://ctrl.example.net/api/v1/local_config",
        Response::new(200, r#"{"config_version": 3}"#),
    );
    let mut store = store_with(&storage);

    let outcome = store
        .refresh(ConfigName::Local, &mut storage, &mut transport)
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::Rejected);
    assert!(storage.writes.is_empty());
    assert_eq!(storage.text(LOCAL_CONFIG_PATH).as_deref(), Some(LOCAL_V5));
}

#[test]
fn malformed_download_leaves_stored_copy_alone() {
    let mut storage = MemStorage::default().with(GLOBAL_CONFIG_PATH, GLOBAL_DOC);
    let mut transport = RoutedTransport::default().route(
        "https://ctrl.example.net/api/v1/global_config",
        Response::new(200, "<html>oops</html>"),
    );
    let mut store = store_with(&storage);

    let outcome = store
        .refresh(ConfigName::Global, &mut storage, &mut transport)
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::Rejected);
    assert_eq!(storage.text(GLOBAL_CONFIG_PATH).as_deref(), Some(GLOBAL_DOC));
    assert_eq!(store.global().global_config_version, 4);
}

#[test]
fn refreshed_local_document_drives_the_next_cycle() {
    // Cycle 1: power-on fetches a local document.
    let mut rig = Rig::new(
        ResetReason::PowerOn,
        MemStorage::default().with(GLOBAL_CONFIG_PATH, GLOBAL_DOC),
        MockWifi::reachable(),
    );
    rig.transport = std::mem::take(&mut rig.transport).route(
        "https://ctrl.example.net/api/v1/local_config",
        Response::new(
            200,
            r#"{"config_version": 1, "sleep_time_s": 30, "sensors": [{"type": "mock"}]}"#,
        ),
    );
    let registry = mock_registry();
    let mut ctl = LifecycleController::new(chip(), &registry);
    assert_eq!(ctl.run(&mut rig.ports()), Terminal::Reboot);

    // Cycle 2: a watchdog reset does not force an update; the stored
    // document is sampled and the node sleeps on its schedule.
    let storage = std::mem::take(&mut rig.storage);
    let mut rig = Rig::new(ResetReason::Watchdog, storage, MockWifi::reachable());
    let mut ctl = LifecycleController::new(chip(), &registry);
    assert_eq!(ctl.run(&mut rig.ports()), Terminal::Sleep { secs: 30 });
    assert_eq!(ctl.sampler().len(), 1);
    assert!(rig.wifi.begins.is_empty());
}
