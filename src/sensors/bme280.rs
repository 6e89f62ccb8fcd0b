//! Bosch BME280 (and humidity-less BMP280) over I²C.
//!
//! The first poll reads the chip id and factory calibration, then triggers a
//! forced-mode conversion; the reading is collected after `warmup_ticks`
//! (default 1).  Compensation is the datasheet's integer reference code.
//!
//! Descriptor parameters: `address` (0x76 or 0x77, default 0x76) and
//! `measure` (`"temperature"`, `"humidity"` or `"pressure"`, default
//! temperature) selecting which value the reporting band applies to.

use log::debug;

use crate::app::ports::TelemetrySink;
use crate::config::SensorDescriptor;
use crate::drivers::hw;
use crate::error::{SensorError, TelemetryError};
use crate::telemetry::FieldValue;

use super::{Common, Conversion, PublishContext, SensorInstance, SensorState};

pub const DEFAULT_ADDRESS: u8 = 0x76;

pub const CHIP_ID_BME280: u8 = 0x60;
pub const CHIP_ID_BMP280: u8 = 0x58;

// --- Register map ---
pub const REG_CHIP_ID: u8 = 0xD0;
pub const REG_CALIB_TP: u8 = 0x88;
pub const REG_CALIB_H: u8 = 0xE1;
pub const REG_CTRL_HUM: u8 = 0xF2;
pub const REG_CTRL_MEAS: u8 = 0xF4;
pub const REG_DATA: u8 = 0xF7;

/// osrs_t = x1, osrs_p = x1, forced mode.
const CTRL_MEAS_FORCED: u8 = 0x25;
/// osrs_h = x1.
const CTRL_HUM_X1: u8 = 0b001;

/// Which compensated value drives the reporting band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Temperature,
    Humidity,
    Pressure,
}

/// Factory trimming parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Calibration {
    /// Decode the 26-byte block at 0x88 and the 7-byte block at 0xE1.
    pub fn parse(tp: &[u8; 26], h: &[u8; 7]) -> Self {
        let u = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);
        Self {
            t1: u(0),
            t2: s(2),
            t3: s(4),
            p1: u(6),
            p2: s(8),
            p3: s(10),
            p4: s(12),
            p5: s(14),
            p6: s(16),
            p7: s(18),
            p8: s(20),
            p9: s(22),
            h1: tp[25],
            h2: i16::from_le_bytes([h[0], h[1]]),
            h3: h[2],
            h4: (i16::from(h[3] as i8) << 4) | i16::from(h[4] & 0x0F),
            h5: (i16::from(h[5] as i8) << 4) | i16::from(h[4] >> 4),
            h6: h[6] as i8,
        }
    }

    /// Temperature in 0.01 °C plus the shared `t_fine` term.
    pub fn compensate_temperature(&self, adc_t: i32) -> (i32, i32) {
        // Widened so out-of-range raw values cannot overflow.
        let adc_t = i64::from(adc_t);
        let t1 = i64::from(self.t1);
        let var1 = (((adc_t >> 3) - (t1 << 1)) * i64::from(self.t2)) >> 11;
        let d = (adc_t >> 4) - t1;
        let var2 = (((d * d) >> 12) * i64::from(self.t3)) >> 14;
        let t_fine = (var1 + var2) as i32;
        ((t_fine * 5 + 128) >> 8, t_fine)
    }

    /// Pressure in Pa as unsigned Q24.8.
    pub fn compensate_pressure(&self, adc_p: i32, t_fine: i32) -> u32 {
        // 64-bit reference arithmetic, carried in i128 so garbage bus data
        // cannot overflow.
        let w = |v: i16| i128::from(v);
        let mut var1 = i128::from(t_fine) - 128_000;
        let mut var2 = var1 * var1 * w(self.p6);
        var2 += (var1 * w(self.p5)) << 17;
        var2 += w(self.p4) << 35;
        var1 = ((var1 * var1 * w(self.p3)) >> 8) + ((var1 * w(self.p2)) << 12);
        var1 = (((1i128 << 47) + var1) * i128::from(self.p1)) >> 33;
        if var1 == 0 {
            return 0;
        }
        let mut p = 1_048_576 - i128::from(adc_p);
        p = (((p << 31) - var2) * 3125) / var1;
        let var1 = (w(self.p9) * (p >> 13) * (p >> 13)) >> 25;
        let var2 = (w(self.p8) * p) >> 19;
        (((p + var1 + var2) >> 8) + (w(self.p7) << 4)) as u32
    }

    /// Relative humidity as unsigned Q22.10 %RH.
    pub fn compensate_humidity(&self, adc_h: i32, t_fine: i32) -> u32 {
        let v = i64::from(t_fine) - 76_800;
        let h2 = i64::from(self.h2);
        let h3 = i64::from(self.h3);
        let h4 = i64::from(self.h4);
        let h5 = i64::from(self.h5);
        let h6 = i64::from(self.h6);
        let mut v = (((i64::from(adc_h) << 14) - (h4 << 20) - (h5 * v) + 16_384) >> 15)
            * (((((((v * h6) >> 10) * (((v * h3) >> 11) + 32_768)) >> 10) + 2_097_152) * h2
                + 8192)
                >> 14);
        v -= ((((v >> 15) * (v >> 15)) >> 7) * i64::from(self.h1)) >> 4;
        let v = v.clamp(0, 419_430_400);
        (v >> 12) as u32
    }
}

/// One compensated reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bme280Reading {
    pub temperature_c: f32,
    pub pressure_hpa: f32,
    /// `None` on a BMP280.
    pub humidity_pct: Option<f32>,
}

/// Convert the 8-byte burst at 0xF7 into a reading.
pub fn decode_burst(cal: &Calibration, raw: &[u8; 8], has_humidity: bool) -> Bme280Reading {
    let adc_p = (i32::from(raw[0]) << 12) | (i32::from(raw[1]) << 4) | (i32::from(raw[2]) >> 4);
    let adc_t = (i32::from(raw[3]) << 12) | (i32::from(raw[4]) << 4) | (i32::from(raw[5]) >> 4);
    let adc_h = (i32::from(raw[6]) << 8) | i32::from(raw[7]);

    let (t_centi, t_fine) = cal.compensate_temperature(adc_t);
    let p_q248 = cal.compensate_pressure(adc_p, t_fine);
    Bme280Reading {
        temperature_c: t_centi as f32 / 100.0,
        pressure_hpa: p_q248 as f32 / 256.0 / 100.0,
        humidity_pct: has_humidity
            .then(|| cal.compensate_humidity(adc_h, t_fine) as f32 / 1024.0),
    }
}

#[derive(Debug, Clone, Copy)]
struct Device {
    address: u8,
    cal: Calibration,
    has_humidity: bool,
}

impl Device {
    /// Identify the chip, load calibration and start a forced conversion.
    fn start(address: u8) -> Result<Self, SensorError> {
        let mut id = [0u8; 1];
        hw::i2c_read_regs(address, REG_CHIP_ID, &mut id)?;
        let has_humidity = match id[0] {
            CHIP_ID_BME280 => true,
            CHIP_ID_BMP280 => false,
            other => {
                debug!("BME280: unexpected chip id 0x{:02x} at 0x{:02x}", other, address);
                return Err(SensorError::NotPresent);
            }
        };
        let mut tp = [0u8; 26];
        hw::i2c_read_regs(address, REG_CALIB_TP, &mut tp)?;
        let mut h = [0u8; 7];
        if has_humidity {
            hw::i2c_read_regs(address, REG_CALIB_H, &mut h)?;
            // ctrl_hum only latches on the following ctrl_meas write.
            hw::i2c_write_reg(address, REG_CTRL_HUM, CTRL_HUM_X1)?;
        }
        hw::i2c_write_reg(address, REG_CTRL_MEAS, CTRL_MEAS_FORCED)?;
        Ok(Self {
            address,
            cal: Calibration::parse(&tp, &h),
            has_humidity,
        })
    }

    fn read(&self) -> Result<Bme280Reading, SensorError> {
        let mut raw = [0u8; 8];
        hw::i2c_read_regs(self.address, REG_DATA, &mut raw)?;
        // 0x80000 in the temperature slot means "measurement skipped".
        if raw[3] == 0x80 && raw[4] == 0 && raw[5] == 0 {
            return Err(SensorError::BusError);
        }
        Ok(decode_burst(&self.cal, &raw, self.has_humidity))
    }
}

/// Bus state of one sensor across the cycle.
#[derive(Debug)]
struct Link {
    address: u8,
    measure: Measure,
    device: Option<Device>,
    reading: Option<Bme280Reading>,
}

impl Conversion for Link {
    fn start(&mut self) -> Result<(), SensorError> {
        self.device = Some(Device::start(self.address)?);
        Ok(())
    }

    fn finish(&mut self) -> Result<f32, SensorError> {
        let dev = self.device.as_ref().ok_or(SensorError::NotPresent)?;
        let r = dev.read()?;
        self.reading = Some(r);
        match self.measure {
            Measure::Temperature => Ok(r.temperature_c),
            Measure::Pressure => Ok(r.pressure_hpa),
            Measure::Humidity => r
                .humidity_pct
                .ok_or(SensorError::InvalidParameter("measure")),
        }
    }
}

#[derive(Debug)]
pub struct Bme280Sensor {
    pub(crate) common: Common,
    io: Link,
}

impl Bme280Sensor {
    pub fn from_descriptor(desc: &SensorDescriptor) -> Result<Self, SensorError> {
        let address = match desc.param_u32("address")? {
            None => DEFAULT_ADDRESS,
            Some(a @ (0x76 | 0x77)) => a as u8,
            Some(_) => return Err(SensorError::InvalidParameter("address")),
        };
        let measure = match desc.param_str("measure")? {
            None => Measure::Temperature,
            Some(m) if m.eq_ignore_ascii_case("temperature") => Measure::Temperature,
            Some(m) if m.eq_ignore_ascii_case("humidity") => Measure::Humidity,
            Some(m) if m.eq_ignore_ascii_case("pressure") => Measure::Pressure,
            Some(_) => return Err(SensorError::InvalidParameter("measure")),
        };
        Ok(Self {
            common: Common::from_descriptor(desc, "bme280", 1)?,
            io: Link {
                address,
                measure,
                device: None,
                reading: None,
            },
        })
    }

    pub fn reading(&self) -> Option<Bme280Reading> {
        self.io.reading
    }
}

impl SensorInstance for Bme280Sensor {
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
        let mut point = ctx
            .point("bme280", &self.common.name)
            .field("temperature", FieldValue::Float(f64::from(r.temperature_c)))
            .field("pressure", FieldValue::Float(f64::from(r.pressure_hpa)));
        if let Some(h) = r.humidity_pct {
            point = point.field("humidity", FieldValue::Float(f64::from(h)));
        }
        sink.write_point(&point)
    }
}
