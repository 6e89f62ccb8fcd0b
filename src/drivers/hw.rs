//! Bus access for the sensor drivers: ADC1 oneshot, I²C master and a
//! bit-banged 1-Wire master.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: raw `esp-idf-sys` calls.  Peripherals are brought up lazily on
//! first use, since which buses a node needs depends on its sensor list.
//! On host/test: per-channel simulation state that tests inject through the
//! `sim_*` functions.

use crate::error::SensorError;

/// I²C pins of the sensor header.
pub const I2C_SDA_GPIO: i32 = 8;
pub const I2C_SCL_GPIO: i32 = 9;
pub const I2C_FREQ_HZ: u32 = 100_000;

/// Highest usable ADC1 channel.
pub const ADC1_MAX_CHANNEL: u8 = 9;

// ═══════════════════════════════════════════════════════════════
//  ESP-IDF implementation
// ═══════════════════════════════════════════════════════════════

#[cfg(target_os = "espidf")]
mod imp {
    use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

    use esp_idf_svc::sys::*;
    use log::{info, warn};

    use super::{I2C_FREQ_HZ, I2C_SCL_GPIO, I2C_SDA_GPIO};
    use crate::error::SensorError;

    const I2C_PORT: i32 = 0;
    const I2C_TIMEOUT_TICKS: u32 = 100;

    static mut ADC1_HANDLE: adc_oneshot_unit_handle_t = core::ptr::null_mut();
    /// Bit per channel: configured for 12 dB / 12 bit.
    static ADC1_CONFIGURED: AtomicU16 = AtomicU16::new(0);
    static I2C_READY: AtomicBool = AtomicBool::new(false);

    fn check(ret: esp_err_t) -> Result<(), SensorError> {
        if ret == ESP_OK as esp_err_t {
            Ok(())
        } else {
            Err(SensorError::BusError)
        }
    }

    // ── ADC ───────────────────────────────────────────────────

    /// SAFETY: single-threaded main loop; the handle is written once.
    unsafe fn adc1_handle() -> Result<adc_oneshot_unit_handle_t, SensorError> {
        unsafe {
            if ADC1_HANDLE.is_null() {
                let cfg = adc_oneshot_unit_init_cfg_t {
                    unit_id: adc_unit_t_ADC_UNIT_1,
                    ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
                    ..Default::default()
                };
                check(adc_oneshot_new_unit(&cfg, &raw mut ADC1_HANDLE))?;
                info!("hw: ADC1 unit ready");
            }
            Ok(ADC1_HANDLE)
        }
    }

    pub fn adc_read(channel: u8) -> Result<u16, SensorError> {
        // SAFETY: main-loop only, see adc1_handle().
        unsafe {
            let handle = adc1_handle()?;
            let bit = 1u16 << channel;
            if ADC1_CONFIGURED.load(Ordering::Relaxed) & bit == 0 {
                let chan_cfg = adc_oneshot_chan_cfg_t {
                    atten: adc_atten_t_ADC_ATTEN_DB_12,
                    bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
                };
                check(adc_oneshot_config_channel(handle, channel as u32, &chan_cfg))?;
                ADC1_CONFIGURED.fetch_or(bit, Ordering::Relaxed);
            }
            let mut raw: i32 = 0;
            check(adc_oneshot_read(handle, channel as u32, &mut raw))?;
            Ok(raw.max(0) as u16)
        }
    }

    // ── I²C ───────────────────────────────────────────────────

    fn i2c_init() -> Result<(), SensorError> {
        if I2C_READY.load(Ordering::Relaxed) {
            return Ok(());
        }
        let mut cfg = i2c_config_t {
            mode: i2c_mode_t_I2C_MODE_MASTER,
            sda_io_num: I2C_SDA_GPIO,
            scl_io_num: I2C_SCL_GPIO,
            sda_pullup_en: true,
            scl_pullup_en: true,
            ..Default::default()
        };
        cfg.__bindgen_anon_1.master.clk_speed = I2C_FREQ_HZ;
        // SAFETY: one-time driver install from the main task.
        unsafe {
            check(i2c_param_config(I2C_PORT, &cfg))?;
            check(i2c_driver_install(I2C_PORT, cfg.mode, 0, 0, 0))?;
        }
        I2C_READY.store(true, Ordering::Relaxed);
        info!("hw: I2C master ready (SDA={}, SCL={})", I2C_SDA_GPIO, I2C_SCL_GPIO);
        Ok(())
    }

    pub fn i2c_read_regs(addr: u8, reg: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        i2c_init()?;
        // SAFETY: driver installed; buffers outlive the blocking call.
        unsafe {
            check(i2c_master_write_read_device(
                I2C_PORT,
                addr,
                &reg,
                1,
                buf.as_mut_ptr(),
                buf.len(),
                I2C_TIMEOUT_TICKS,
            ))
        }
        .map_err(|_| SensorError::NotPresent)
    }

    pub fn i2c_write_reg(addr: u8, reg: u8, value: u8) -> Result<(), SensorError> {
        i2c_init()?;
        let bytes = [reg, value];
        // SAFETY: driver installed; buffer outlives the blocking call.
        unsafe {
            check(i2c_master_write_to_device(
                I2C_PORT,
                addr,
                bytes.as_ptr(),
                bytes.len(),
                I2C_TIMEOUT_TICKS,
            ))
        }
        .map_err(|_| SensorError::NotPresent)
    }

    // ── 1-Wire (bit-banged, open drain) ───────────────────────

    fn ow_setup(pin: i32) {
        // SAFETY: reconfigures a pin owned by this sensor only.
        unsafe {
            gpio_set_direction(pin, gpio_mode_t_GPIO_MODE_INPUT_OUTPUT_OD);
            gpio_set_pull_mode(pin, gpio_pull_mode_t_GPIO_PULLUP_ONLY);
            gpio_set_level(pin, 1);
        }
    }

    fn ow_reset(pin: i32) -> bool {
        // SAFETY: timing-critical register pokes on an owned pin.
        unsafe {
            gpio_set_level(pin, 0);
            esp_rom_delay_us(480);
            gpio_set_level(pin, 1);
            esp_rom_delay_us(70);
            let present = gpio_get_level(pin) == 0;
            esp_rom_delay_us(410);
            present
        }
    }

    fn ow_write_bit(pin: i32, bit: bool) {
        // SAFETY: as above.
        unsafe {
            gpio_set_level(pin, 0);
            if bit {
                esp_rom_delay_us(6);
                gpio_set_level(pin, 1);
                esp_rom_delay_us(64);
            } else {
                esp_rom_delay_us(60);
                gpio_set_level(pin, 1);
                esp_rom_delay_us(10);
            }
        }
    }

    fn ow_read_bit(pin: i32) -> bool {
        // SAFETY: as above.
        unsafe {
            gpio_set_level(pin, 0);
            esp_rom_delay_us(6);
            gpio_set_level(pin, 1);
            esp_rom_delay_us(9);
            let bit = gpio_get_level(pin) != 0;
            esp_rom_delay_us(55);
            bit
        }
    }

    fn ow_write_byte(pin: i32, byte: u8) {
        for i in 0..8 {
            ow_write_bit(pin, (byte >> i) & 1 != 0);
        }
    }

    fn ow_read_byte(pin: i32) -> u8 {
        (0..8).fold(0u8, |acc, i| acc | (u8::from(ow_read_bit(pin)) << i))
    }

    fn ow_select(pin: i32, rom: Option<&[u8; 8]>) -> Result<(), SensorError> {
        ow_setup(pin);
        if !ow_reset(pin) {
            warn!("hw: no 1-Wire presence pulse on GPIO{}", pin);
            return Err(SensorError::NotPresent);
        }
        match rom {
            Some(rom) => {
                ow_write_byte(pin, 0x55);
                rom.iter().for_each(|b| ow_write_byte(pin, *b));
            }
            None => ow_write_byte(pin, 0xCC),
        }
        Ok(())
    }

    pub fn onewire_command(pin: u8, rom: Option<&[u8; 8]>, cmd: u8) -> Result<(), SensorError> {
        let pin = i32::from(pin);
        ow_select(pin, rom)?;
        ow_write_byte(pin, cmd);
        Ok(())
    }

    pub fn onewire_query(
        pin: u8,
        rom: Option<&[u8; 8]>,
        cmd: u8,
        buf: &mut [u8],
    ) -> Result<(), SensorError> {
        let pin = i32::from(pin);
        ow_select(pin, rom)?;
        ow_write_byte(pin, cmd);
        buf.iter_mut().for_each(|b| *b = ow_read_byte(pin));
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
pub use imp::{adc_read, i2c_read_regs, i2c_write_reg, onewire_command, onewire_query};

// ═══════════════════════════════════════════════════════════════
//  Host simulation
// ═══════════════════════════════════════════════════════════════

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::SensorError;

    /// Sentinel for "channel not wired".
    const ADC_NONE: u32 = u32::MAX;

    static ADC: [AtomicU32; 10] = [const { AtomicU32::new(ADC_NONE) }; 10];
    static I2C: Mutex<BTreeMap<u8, [u8; 256]>> = Mutex::new(BTreeMap::new());
    static ONEWIRE: Mutex<BTreeMap<u8, OneWireSim>> = Mutex::new(BTreeMap::new());

    #[derive(Debug, Clone, Copy)]
    struct OneWireSim {
        scratchpad: [u8; 9],
        rom: Option<[u8; 8]>,
        converts: u32,
    }

    /// Set (or with `None`, disconnect) an ADC channel.
    pub fn sim_set_adc(channel: u8, raw: Option<u16>) {
        if let Some(slot) = ADC.get(channel as usize) {
            slot.store(raw.map_or(ADC_NONE, u32::from), Ordering::Relaxed);
        }
    }

    /// Load `bytes` into the register file of the device at `addr`.
    pub fn sim_load_i2c(addr: u8, reg: u8, bytes: &[u8]) {
        if let Ok(mut bus) = I2C.lock() {
            let regs = bus.entry(addr).or_insert([0u8; 256]);
            let start = reg as usize;
            let end = (start + bytes.len()).min(256);
            regs[start..end].copy_from_slice(&bytes[..end - start]);
        }
    }

    pub fn sim_read_i2c(addr: u8, reg: u8) -> Option<u8> {
        I2C.lock().ok()?.get(&addr).map(|r| r[reg as usize])
    }

    pub fn sim_remove_i2c(addr: u8) {
        if let Ok(mut bus) = I2C.lock() {
            bus.remove(&addr);
        }
    }

    /// Attach a 1-Wire device to `pin`.  With `rom` set, the device only
    /// answers MATCH ROM for that code.
    pub fn sim_attach_onewire(pin: u8, scratchpad: [u8; 9], rom: Option<[u8; 8]>) {
        if let Ok(mut bus) = ONEWIRE.lock() {
            bus.insert(
                pin,
                OneWireSim {
                    scratchpad,
                    rom,
                    converts: 0,
                },
            );
        }
    }

    pub fn sim_detach_onewire(pin: u8) {
        if let Ok(mut bus) = ONEWIRE.lock() {
            bus.remove(&pin);
        }
    }

    /// Number of CONVERT T commands the device on `pin` has seen.
    pub fn sim_onewire_converts(pin: u8) -> u32 {
        ONEWIRE
            .lock()
            .ok()
            .and_then(|bus| bus.get(&pin).map(|d| d.converts))
            .unwrap_or(0)
    }

    pub fn adc_read(channel: u8) -> Result<u16, SensorError> {
        match ADC.get(channel as usize).map(|s| s.load(Ordering::Relaxed)) {
            Some(v) if v != ADC_NONE => Ok(v as u16),
            _ => Err(SensorError::BusError),
        }
    }

    pub fn i2c_read_regs(addr: u8, reg: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        let bus = I2C.lock().map_err(|_| SensorError::BusError)?;
        let regs = bus.get(&addr).ok_or(SensorError::NotPresent)?;
        let start = reg as usize;
        if start + buf.len() > regs.len() {
            return Err(SensorError::BusError);
        }
        buf.copy_from_slice(&regs[start..start + buf.len()]);
        Ok(())
    }

    pub fn i2c_write_reg(addr: u8, reg: u8, value: u8) -> Result<(), SensorError> {
        let mut bus = I2C.lock().map_err(|_| SensorError::BusError)?;
        let regs = bus.get_mut(&addr).ok_or(SensorError::NotPresent)?;
        regs[reg as usize] = value;
        Ok(())
    }

    fn with_selected<T>(
        pin: u8,
        rom: Option<&[u8; 8]>,
        f: impl FnOnce(&mut OneWireSim) -> T,
    ) -> Result<T, SensorError> {
        let mut bus = ONEWIRE.lock().map_err(|_| SensorError::BusError)?;
        let dev = bus.get_mut(&pin).ok_or(SensorError::NotPresent)?;
        if let (Some(want), Some(have)) = (rom, dev.rom.as_ref()) {
            if want != have {
                return Err(SensorError::NotPresent);
            }
        }
        Ok(f(dev))
    }

    pub fn onewire_command(pin: u8, rom: Option<&[u8; 8]>, cmd: u8) -> Result<(), SensorError> {
        with_selected(pin, rom, |dev| {
            if cmd == 0x44 {
                dev.converts += 1;
            }
        })
    }

    pub fn onewire_query(
        pin: u8,
        rom: Option<&[u8; 8]>,
        _cmd: u8,
        buf: &mut [u8],
    ) -> Result<(), SensorError> {
        with_selected(pin, rom, |dev| {
            let n = buf.len().min(dev.scratchpad.len());
            buf[..n].copy_from_slice(&dev.scratchpad[..n]);
        })
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::*;

/// Validate an ADC1 channel number from a descriptor.
pub fn check_adc_channel(channel: u32) -> Result<u8, SensorError> {
    u8::try_from(channel)
        .ok()
        .filter(|c| *c <= ADC1_MAX_CHANNEL)
        .ok_or(SensorError::InvalidParameter("channel"))
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn adc_channel_bounds() {
        assert_eq!(check_adc_channel(0), Ok(0));
        assert_eq!(check_adc_channel(9), Ok(9));
        assert!(check_adc_channel(10).is_err());
        assert!(check_adc_channel(300).is_err());
    }

    #[test]
    fn sim_i2c_register_file() {
        sim_load_i2c(0x10, 0xF0, &[1, 2, 3]);
        let mut buf = [0u8; 3];
        i2c_read_regs(0x10, 0xF0, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        i2c_write_reg(0x10, 0xF1, 9).unwrap();
        assert_eq!(sim_read_i2c(0x10, 0xF1), Some(9));
        assert_eq!(i2c_read_regs(0x11, 0, &mut buf), Err(SensorError::NotPresent));
    }

    #[test]
    fn sim_onewire_match_rom() {
        let rom = [0x28, 1, 2, 3, 4, 5, 6, 7];
        sim_attach_onewire(30, [0u8; 9], Some(rom));
        assert!(onewire_command(30, Some(&rom), 0x44).is_ok());
        assert!(onewire_command(30, None, 0x44).is_ok());
        assert_eq!(sim_onewire_converts(30), 2);
        let other = [0x28, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            onewire_command(30, Some(&other), 0x44),
            Err(SensorError::NotPresent)
        );
    }
}
