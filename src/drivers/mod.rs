//! Peripheral access used by the sensor drivers.

pub mod hw;
