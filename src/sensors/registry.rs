//! Sensor-kind registry: type identifier → factory.
//!
//! Built once by [`bootstrap`] before any descriptor is parsed and then
//! only read.  Lookups are case-insensitive.  A descriptor that cannot be
//! instantiated is skipped with a warning; it never aborts the batch.

use log::{debug, info, warn};

use crate::config::SensorDescriptor;
use crate::error::SensorError;

use super::Sensor;
use super::adc::AdcSensor;
use super::bme280::Bme280Sensor;
use super::ds18b20::Ds18b20Sensor;

/// Builds one instance from a descriptor.
pub type Factory<S> = fn(&SensorDescriptor) -> Result<S, SensorError>;

/// Mapping from lower-cased sensor type to factory.
pub struct SensorRegistry<S = Sensor> {
    entries: Vec<(String, Factory<S>)>,
}

impl<S> SensorRegistry<S> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register `factory` under `kind`.  Returns `false` (and changes
    /// nothing) for an empty kind or one that is already registered.
    pub fn register(&mut self, kind: &str, factory: Factory<S>) -> bool {
        let kind = kind.trim();
        if kind.is_empty() {
            warn!("Registry: refusing factory with empty type");
            return false;
        }
        if self.contains(kind) {
            debug!("Registry: '{}' already registered", kind);
            return false;
        }
        self.entries.push((kind.to_ascii_lowercase(), factory));
        true
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.lookup(kind).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build one instance, or `None` when the descriptor has no type, the
    /// type is unknown, or the factory fails.
    pub fn instantiate(&self, desc: &SensorDescriptor) -> Option<S> {
        let Some(kind) = desc.kind.as_deref() else {
            warn!("Registry: skipping sensor: {}", SensorError::MissingType);
            return None;
        };
        let Some(factory) = self.lookup(kind) else {
            warn!("Registry: skipping sensor '{}': {}", kind, SensorError::UnknownType);
            return None;
        };
        match factory(desc) {
            Ok(sensor) => Some(sensor),
            Err(e) => {
                warn!("Registry: skipping sensor '{}': {}", kind, e);
                None
            }
        }
    }

    /// Build every instantiable descriptor, preserving order.
    pub fn instantiate_all(&self, descs: &[SensorDescriptor]) -> Vec<S> {
        let sensors: Vec<S> = descs.iter().filter_map(|d| self.instantiate(d)).collect();
        info!(
            "Registry: {} of {} sensors instantiated",
            sensors.len(),
            descs.len()
        );
        sensors
    }

    fn lookup(&self, kind: &str) -> Option<Factory<S>> {
        let kind = kind.trim();
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(kind))
            .map(|(_, f)| *f)
    }
}

impl<S> Default for SensorRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn make_adc(desc: &SensorDescriptor) -> Result<Sensor, SensorError> {
    AdcSensor::from_descriptor(desc).map(Sensor::Adc)
}

fn make_bme280(desc: &SensorDescriptor) -> Result<Sensor, SensorError> {
    Bme280Sensor::from_descriptor(desc).map(Sensor::Bme280)
}

fn make_ds18b20(desc: &SensorDescriptor) -> Result<Sensor, SensorError> {
    Ds18b20Sensor::from_descriptor(desc).map(Sensor::Ds18b20)
}

/// Type identifiers of the built-in kinds.
pub const BUILTIN_KINDS: [&str; 3] = ["adc", "bme280", "ds18b20"];

/// Registry holding every built-in sensor kind.
pub fn bootstrap() -> SensorRegistry {
    let mut registry = SensorRegistry::new();
    registry.register("adc", make_adc);
    registry.register("bme280", make_bme280);
    // The BMP280 shares the driver; it just lacks humidity.
    registry.register("bmp280", make_bme280);
    registry.register("ds18b20", make_ds18b20);
    registry
}
