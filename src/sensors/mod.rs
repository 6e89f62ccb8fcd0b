//! Sensor subsystem: the uniform polling protocol, the built-in kinds, the
//! [`registry`] that builds them from descriptors and the [`sampler`] that
//! drives them through a wake cycle.
//!
//! Every kind follows the same per-cycle life:
//!
//! ```text
//!  first sample()  ── start conversion ──▶ INITIALIZING (warm-up ticks)
//!        │
//!        ▼
//!  read ok  ──▶ verdict latched: VALUE_READY_FOR_UPLOAD | NO_UPDATE
//!  read err ──▶ SAMPLING_IN_PROGRESS (retried next tick, never holds the round)
//! ```

pub mod adc;
pub mod bme280;
pub mod ds18b20;
pub mod registry;
pub mod sampler;

use log::debug;

use crate::app::ports::TelemetrySink;
use crate::config::SensorDescriptor;
use crate::error::{SensorError, TelemetryError};
use crate::telemetry::Point;

use adc::AdcSensor;
use bme280::Bme280Sensor;
use ds18b20::Ds18b20Sensor;

/// What a sensor reports for one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    /// Still warming up or converting; holds the round open.
    Initializing,
    /// No value this tick (bus hiccup); does not hold the round.
    SamplingInProgress,
    /// A reading worth uploading exists.
    ValueReadyForUpload,
    /// A reading exists but is inside the reporting band.
    NoUpdate,
}

/// Tags stamped on every point published in a cycle.
#[derive(Debug, Clone, Copy)]
pub struct PublishContext<'a> {
    pub device: &'a str,
    pub chip_id: &'a str,
    pub firmware: &'a str,
    pub timestamp: Option<u64>,
}

impl PublishContext<'_> {
    /// Start a point carrying the device-wide tags.
    pub fn point(&self, measurement: &str, sensor_name: &str) -> Point {
        let p = Point::new(measurement)
            .tag("device", self.device)
            .tag("chip_id", self.chip_id)
            .tag("firmware", self.firmware)
            .tag("name", sensor_name);
        match self.timestamp {
            Some(ts) => p.at(ts),
            None => p,
        }
    }
}

/// Capability set every sensor kind implements.
pub trait SensorInstance {
    /// Advance by one poll and report the resulting state.
    fn sample(&mut self) -> SensorState;

    /// Append this sensor's latest reading to `sink`.  A sensor without a
    /// reading appends nothing.
    fn publish(
        &self,
        sink: &mut dyn TelemetrySink,
        ctx: &PublishContext<'_>,
    ) -> Result<(), TelemetryError>;
}

/// The closed set of built-in sensor kinds.
#[derive(Debug)]
pub enum Sensor {
    Adc(AdcSensor),
    Bme280(Bme280Sensor),
    Ds18b20(Ds18b20Sensor),
}

impl Sensor {
    pub fn name(&self) -> &str {
        match self {
            Self::Adc(s) => &s.common.name,
            Self::Bme280(s) => &s.common.name,
            Self::Ds18b20(s) => &s.common.name,
        }
    }
}

impl SensorInstance for Sensor {
    fn sample(&mut self) -> SensorState {
        match self {
            Self::Adc(s) => s.sample(),
            Self::Bme280(s) => s.sample(),
            Self::Ds18b20(s) => s.sample(),
        }
    }

    fn publish(
        &self,
        sink: &mut dyn TelemetrySink,
        ctx: &PublishContext<'_>,
    ) -> Result<(), TelemetryError> {
        match self {
            Self::Adc(s) => s.publish(sink, ctx),
            Self::Bme280(s) => s.publish(sink, ctx),
            Self::Ds18b20(s) => s.publish(sink, ctx),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Common parameters
// ───────────────────────────────────────────────────────────────

/// Optional band of "uninteresting" values.  Readings inside it are
/// `NoUpdate`; readings outside it (or any reading when no band is set)
/// are `ValueReadyForUpload`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReportBand {
    pub below: Option<f32>,
    pub above: Option<f32>,
}

impl ReportBand {
    pub fn verdict(&self, value: f32) -> SensorState {
        if self.below.is_none() && self.above.is_none() {
            return SensorState::ValueReadyForUpload;
        }
        let low = self.below.is_some_and(|b| value < b);
        let high = self.above.is_some_and(|a| value > a);
        if low || high {
            SensorState::ValueReadyForUpload
        } else {
            SensorState::NoUpdate
        }
    }
}

/// Parameters shared by every kind, plus the per-cycle polling progress.
#[derive(Debug, Clone)]
pub struct Common {
    pub name: String,
    pub band: ReportBand,
    warmup_left: u32,
    started: bool,
    latched: Option<SensorState>,
}

impl Common {
    /// Parse `name`, `warmup_ticks`, `report_below` and `report_above`.
    pub fn from_descriptor(
        desc: &SensorDescriptor,
        default_name: &str,
        default_warmup: u32,
    ) -> Result<Self, SensorError> {
        let name = desc.param_str("name")?.unwrap_or(default_name).to_owned();
        let warmup = desc.param_u32("warmup_ticks")?.unwrap_or(default_warmup);
        let band = ReportBand {
            below: desc.param_f32("report_below")?,
            above: desc.param_f32("report_above")?,
        };
        if let (Some(b), Some(a)) = (band.below, band.above) {
            if b > a {
                return Err(SensorError::InvalidParameter("report_below"));
            }
        }
        Ok(Self {
            name,
            band,
            warmup_left: warmup,
            started: false,
            latched: None,
        })
    }

    /// Drive one poll of `conv`: start it on the first poll, count down the
    /// warm-up, then finish it and latch the verdict.
    pub(crate) fn poll(&mut self, conv: &mut impl Conversion) -> SensorState {
        if let Some(state) = self.latched {
            return state;
        }
        if !self.started {
            if let Err(e) = conv.start() {
                debug!("Sensor '{}': start failed: {}", self.name, e);
                return SensorState::SamplingInProgress;
            }
            self.started = true;
        }
        if self.warmup_left > 0 {
            self.warmup_left -= 1;
            return SensorState::Initializing;
        }
        match conv.finish() {
            Ok(value) => {
                let verdict = self.band.verdict(value);
                self.latched = Some(verdict);
                verdict
            }
            Err(e) => {
                debug!("Sensor '{}': read failed: {}", self.name, e);
                SensorState::SamplingInProgress
            }
        }
    }
}

/// The bus side of a measurement.
pub(crate) trait Conversion {
    /// Kick off a measurement.
    fn start(&mut self) -> Result<(), SensorError>;

    /// Collect the finished measurement, keep it, and return the value the
    /// reporting band applies to.
    fn finish(&mut self) -> Result<f32, SensorError>;
}
