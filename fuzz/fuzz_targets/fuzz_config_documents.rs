//! Fuzz target: configuration document loading
//!
//! Feeds arbitrary bytes to `ConfigStore` as both stored documents and
//! verifies:
//! - No panics while parsing, normalising or instantiating sensors
//! - A global document that fails to load leaves defaults plus the
//!   needs-refresh flag
//! - Normalisation never lengthens the control URL
//!
//! cargo fuzz run fuzz_config_documents

#![no_main]

use std::collections::HashMap;

use libfuzzer_sys::fuzz_target;
use sensornode::app::ports::StoragePort;
use sensornode::config::{ChipId, GLOBAL_CONFIG_PATH, GlobalConfig, LOCAL_CONFIG_PATH};
use sensornode::error::StorageError;
use sensornode::sensors::registry;
use sensornode::update::ConfigStore;

struct MemStore {
    data: HashMap<String, Vec<u8>>,
}

impl StoragePort for MemStore {
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.data.get(path).cloned().ok_or(StorageError::NotFound)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        self.data.insert(path.to_owned(), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.data.contains_key(path)
    }
}

fuzz_target!(|data: &[u8]| {
    let store = MemStore {
        data: HashMap::from([
            (GLOBAL_CONFIG_PATH.to_owned(), data.to_vec()),
            (LOCAL_CONFIG_PATH.to_owned(), data.to_vec()),
        ]),
    };

    let mut cfg = ConfigStore::new(ChipId::new());
    let parsed: Option<GlobalConfig> = serde_json::from_slice(data).ok();
    let global = cfg.load_global(&store).clone();
    match parsed {
        Some(raw) => {
            assert!(!cfg.global_needs_refresh());
            assert!(global.ctrl_url.len() <= raw.ctrl_url.len());
        }
        None => {
            assert!(cfg.global_needs_refresh());
            assert_eq!(global, GlobalConfig::default());
        }
    }

    if let Some(local) = cfg.load_local(&store) {
        let registry = registry::bootstrap();
        let sensors = registry.instantiate_all(&local.sensors);
        assert!(sensors.len() <= local.sensors.len());
    }
});
