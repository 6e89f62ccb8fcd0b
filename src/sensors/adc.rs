//! Raw analog channel with a linear calibration.
//!
//! Descriptor parameters: `channel` (required, ADC1 0..=9), `samples`
//! (averaging window, default 4), `scale` (default 1.0), `offset`
//! (default 0.0), plus the common ones.  The published value is
//! `mean(raw) * scale + offset`.

use crate::app::ports::TelemetrySink;
use crate::config::SensorDescriptor;
use crate::drivers::hw;
use crate::error::{SensorError, TelemetryError};
use crate::telemetry::FieldValue;

use super::{Common, Conversion, PublishContext, SensorInstance, SensorState};

const DEFAULT_SAMPLES: u32 = 4;
const MAX_SAMPLES: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcReading {
    pub raw: u16,
    pub value: f32,
}

/// Where and how to read the channel, plus the last reading.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Channel {
    channel: u8,
    samples: u32,
    scale: f32,
    offset: f32,
    reading: Option<AdcReading>,
}

impl Conversion for Channel {
    fn start(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn finish(&mut self) -> Result<f32, SensorError> {
        let mut sum = 0u32;
        for _ in 0..self.samples {
            sum += u32::from(hw::adc_read(self.channel)?);
        }
        let raw = (sum / self.samples) as u16;
        let value = f32::from(raw) * self.scale + self.offset;
        self.reading = Some(AdcReading { raw, value });
        Ok(value)
    }
}

#[derive(Debug)]
pub struct AdcSensor {
    pub(crate) common: Common,
    io: Channel,
}

impl AdcSensor {
    pub fn from_descriptor(desc: &SensorDescriptor) -> Result<Self, SensorError> {
        let channel = desc
            .param_u32("channel")?
            .ok_or(SensorError::InvalidParameter("channel"))?;
        let samples = desc.param_u32("samples")?.unwrap_or(DEFAULT_SAMPLES);
        if samples == 0 || samples > MAX_SAMPLES {
            return Err(SensorError::InvalidParameter("samples"));
        }
        Ok(Self {
            common: Common::from_descriptor(desc, "adc", 0)?,
            io: Channel {
                channel: hw::check_adc_channel(channel)?,
                samples,
                scale: desc.param_f32("scale")?.unwrap_or(1.0),
                offset: desc.param_f32("offset")?.unwrap_or(0.0),
                reading: None,
            },
        })
    }

    pub fn reading(&self) -> Option<AdcReading> {
        self.io.reading
    }
}

impl SensorInstance for AdcSensor {
    fn sample(&mut self) -> SensorState {
        self.common.poll(&mut self.io)
    }

    fn publish(
        &self,
        sink: &mut dyn TelemetrySink,
        ctx: &PublishContext<'_>,
    ) -> Result<(), TelemetryError> {
        let Some(r) = self.io.reading else {
            return Ok(());
        };
        let point = ctx
            .point("adc", &self.common.name)
            .field("value", FieldValue::Float(f64::from(r.value)))
            .field("raw", FieldValue::Int(i64::from(r.raw)));
        sink.write_point(&point)
    }
}
