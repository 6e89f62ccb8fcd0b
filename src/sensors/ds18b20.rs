//! Maxim DS18B20 1-Wire temperature probe.
//!
//! Descriptor parameters: `pin` (required GPIO), `rom` (optional 64-bit
//! ROM code as 16 hex digits; without it the probe must be alone on the
//! bus), plus the common ones.  A 12-bit conversion takes ~750 ms, so the
//! default warm-up is one tick.

use log::debug;

use crate::app::ports::TelemetrySink;
use crate::config::SensorDescriptor;
use crate::drivers::hw;
use crate::error::{SensorError, TelemetryError};
use crate::telemetry::FieldValue;

use super::{Common, Conversion, PublishContext, SensorInstance, SensorState};

// --- Function commands ---
pub const CMD_CONVERT_T: u8 = 0x44;
pub const CMD_READ_SCRATCHPAD: u8 = 0xBE;

/// Family code of every DS18B20 ROM.
pub const FAMILY_CODE: u8 = 0x28;

const MAX_GPIO: u32 = 48;

/// Scratchpad temperature after power-on, before any conversion ran.
const POWER_ON_RAW: i16 = 0x0550;

/// Dallas/Maxim CRC-8 (polynomial x^8 + x^5 + x^4 + 1, reflected).
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |mut crc, &byte| {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
        crc
    })
}

/// Decode a 9-byte scratchpad into °C.
pub fn decode_scratchpad(sp: &[u8; 9]) -> Result<f32, SensorError> {
    if sp.iter().all(|b| *b == 0) || sp.iter().all(|b| *b == 0xFF) {
        return Err(SensorError::NotPresent);
    }
    if crc8(&sp[..8]) != sp[8] {
        return Err(SensorError::CrcMismatch);
    }
    let mut raw = i16::from_le_bytes([sp[0], sp[1]]);
    if raw == POWER_ON_RAW {
        debug!("DS18B20: power-on value in scratchpad, conversion did not run");
        return Err(SensorError::BusError);
    }
    // Undefined low bits at reduced resolution (config bits R1:R0).
    raw &= match (sp[4] >> 5) & 0b11 {
        0 => !0b111,
        1 => !0b11,
        2 => !0b1,
        _ => !0,
    };
    Ok(f32::from(raw) / 16.0)
}

/// Parse a ROM code given as hex digits, `:`/`-` separators allowed.
pub fn parse_rom(text: &str) -> Result<[u8; 8], SensorError> {
    const ERR: SensorError = SensorError::InvalidParameter("rom");
    let digits: Vec<u8> = text
        .bytes()
        .filter(|c| *c != b':' && *c != b'-')
        .map(|c| (c as char).to_digit(16).map(|d| d as u8).ok_or(ERR))
        .collect::<Result<_, _>>()?;
    if digits.len() != 16 {
        return Err(ERR);
    }
    let mut rom = [0u8; 8];
    for (i, pair) in digits.chunks_exact(2).enumerate() {
        rom[i] = (pair[0] << 4) | pair[1];
    }
    if rom[0] != FAMILY_CODE || crc8(&rom[..7]) != rom[7] {
        return Err(ERR);
    }
    Ok(rom)
}

#[derive(Debug)]
struct Probe {
    pin: u8,
    rom: Option<[u8; 8]>,
    celsius: Option<f32>,
}

impl Conversion for Probe {
    fn start(&mut self) -> Result<(), SensorError> {
        hw::onewire_command(self.pin, self.rom.as_ref(), CMD_CONVERT_T)
    }

    fn finish(&mut self) -> Result<f32, SensorError> {
        let mut sp = [0u8; 9];
        hw::onewire_query(self.pin, self.rom.as_ref(), CMD_READ_SCRATCHPAD, &mut sp)?;
        let c = decode_scratchpad(&sp)?;
        self.celsius = Some(c);
        Ok(c)
    }
}

#[derive(Debug)]
pub struct Ds18b20Sensor {
    pub(crate) common: Common,
    io: Probe,
}

impl Ds18b20Sensor {
    pub fn from_descriptor(desc: &SensorDescriptor) -> Result<Self, SensorError> {
        let pin = desc
            .param_u32("pin")?
            .filter(|p| *p <= MAX_GPIO)
            .ok_or(SensorError::InvalidParameter("pin"))?;
        let rom = desc.param_str("rom")?.map(parse_rom).transpose()?;
        Ok(Self {
            common: Common::from_descriptor(desc, "ds18b20", 1)?,
            io: Probe {
                pin: pin as u8,
                rom,
                celsius: None,
            },
        })
    }

    pub fn celsius(&self) -> Option<f32> {
        self.io.celsius
    }
}

impl SensorInstance for Ds18b20Sensor {
    fn sample(&mut self) -> SensorState {
        self.common.poll(&mut self.io)
    }

    fn publish(
        &self,
        sink: &mut dyn TelemetrySink,
        ctx: &PublishContext<'_>,
    ) -> Result<(), TelemetryError> {
        let Some(c) = self.io.celsius else {
            return Ok(());
        };
        let point = ctx
            .point("ds18b20", &self.common.name)
            .field("temperature", FieldValue::Float(f64::from(c)));
        sink.write_point(&point)
    }
}
