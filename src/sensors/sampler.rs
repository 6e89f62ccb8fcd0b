//! One wake cycle's worth of sensor polling.
//!
//! The sampler owns the instantiated sensors for the cycle, polls each of
//! them exactly once per [`tick`](SensorSampler::tick) in registration
//! order, and aggregates two flags:
//!
//! - `round_complete`: set by the first tick on which no sensor reported
//!   `Initializing`; never cleared.
//! - `upload_requested`: set by any `ValueReadyForUpload`; never cleared.
//!
//! Both flags only reset by building a new sampler on the next wake.

use log::{debug, info, warn};

use crate::app::ports::TelemetrySink;
use crate::error::TelemetryError;

use super::{PublishContext, Sensor, SensorInstance, SensorState};

/// Result of a [`SensorSampler::publish`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Sensors whose `publish` succeeded.
    pub published: usize,
    /// Sensors whose `publish` the sink refused.
    pub failed: usize,
    pub first_error: Option<TelemetryError>,
}

pub struct SensorSampler<S = Sensor> {
    sensors: Vec<S>,
    round_complete: bool,
    upload_requested: bool,
    ticks: u32,
}

impl<S: SensorInstance> SensorSampler<S> {
    pub fn new(sensors: Vec<S>) -> Self {
        Self {
            sensors,
            round_complete: false,
            upload_requested: false,
            ticks: 0,
        }
    }

    /// Poll every sensor once.  Returns `round_complete()`.
    pub fn tick(&mut self) -> bool {
        self.ticks += 1;
        let mut initializing = 0usize;
        for (idx, sensor) in self.sensors.iter_mut().enumerate() {
            match sensor.sample() {
                SensorState::Initializing => initializing += 1,
                SensorState::ValueReadyForUpload => {
                    if !self.upload_requested {
                        info!("Sampler: sensor #{} requests upload", idx);
                    }
                    self.upload_requested = true;
                }
                SensorState::SamplingInProgress | SensorState::NoUpdate => {}
            }
        }
        if initializing == 0 && !self.round_complete {
            info!(
                "Sampler: round complete after {} tick(s), upload={}",
                self.ticks, self.upload_requested
            );
            self.round_complete = true;
        } else if initializing > 0 {
            debug!("Sampler: {} sensor(s) still initializing", initializing);
        }
        self.round_complete
    }

    pub fn round_complete(&self) -> bool {
        self.round_complete
    }

    pub fn upload_requested(&self) -> bool {
        self.upload_requested
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Hand every sensor the sink, in order.  Failures are counted and the
    /// pass continues; nothing is retried.
    pub fn publish(
        &self,
        sink: &mut dyn TelemetrySink,
        ctx: &PublishContext<'_>,
    ) -> PublishSummary {
        let mut summary = PublishSummary::default();
        for (idx, sensor) in self.sensors.iter().enumerate() {
            match sensor.publish(sink, ctx) {
                Ok(()) => summary.published += 1,
                Err(e) => {
                    warn!("Sampler: sensor #{} publish failed: {}", idx, e);
                    summary.failed += 1;
                    summary.first_error.get_or_insert(e);
                }
            }
        }
        summary
    }
}
