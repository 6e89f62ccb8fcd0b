//! SensorNode firmware library.
//!
//! Exposes the lifecycle core, the sensor drivers and the adapters for
//! integration testing.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module; host builds get the
//! simulation backends.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod retained;
pub mod sensors;
pub mod telemetry;
pub mod update;
