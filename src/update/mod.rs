//! Remote updates: versioned configuration documents and firmware images.

pub mod config_store;
pub mod firmware;

pub use config_store::{ConfigName, ConfigStore, UpdateOutcome};
pub use firmware::{FirmwareOutcome, check_and_apply, is_newer};
