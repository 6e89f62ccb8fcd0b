//! Power manager adapter: reset reason, RTC-retained blob, deep sleep.
//!
//! - **`target_os = "espidf"`**: `esp_reset_reason`, a 16-byte buffer in
//!   RTC slow memory (survives deep sleep, garbage after power-on) and
//!   `esp_deep_sleep_start` with a timer wake-up.
//! - **all other targets**: a process-wide buffer stands in for RTC memory;
//!   sleep and restart exit the process.

use log::info;

use crate::app::ports::{PowerPort, ResetReason};
use crate::retained::{RETAINED_LEN, RetainedState};

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
#[unsafe(link_section = ".rtc.data")]
static mut RTC_RETAINED: [u8; RETAINED_LEN] = [0; RETAINED_LEN];

#[cfg(target_os = "espidf")]
pub struct PowerAdapter;

#[cfg(target_os = "espidf")]
impl PowerAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "espidf")]
impl PowerPort for PowerAdapter {
    fn reset_reason(&self) -> ResetReason {
        use esp_idf_svc::sys::*;

        // SAFETY: plain query of the ROM reset cause.
        #[allow(non_upper_case_globals)]
        match unsafe { esp_reset_reason() } {
            esp_reset_reason_t_ESP_RST_POWERON => ResetReason::PowerOn,
            esp_reset_reason_t_ESP_RST_EXT => ResetReason::External,
            esp_reset_reason_t_ESP_RST_DEEPSLEEP => ResetReason::DeepSleepWake,
            esp_reset_reason_t_ESP_RST_SW => ResetReason::Software,
            esp_reset_reason_t_ESP_RST_PANIC => ResetReason::Panic,
            esp_reset_reason_t_ESP_RST_INT_WDT
            | esp_reset_reason_t_ESP_RST_TASK_WDT
            | esp_reset_reason_t_ESP_RST_WDT => ResetReason::Watchdog,
            esp_reset_reason_t_ESP_RST_BROWNOUT => ResetReason::Brownout,
            _ => ResetReason::Unknown,
        }
    }

    fn read_retained(&self) -> Option<RetainedState> {
        // SAFETY: single-threaded boot path; no concurrent writer.
        let blob = unsafe { *(&raw const RTC_RETAINED) };
        RetainedState::decode(&blob)
    }

    fn write_retained(&mut self, state: &RetainedState) {
        // SAFETY: single-threaded sleep path; no concurrent reader.
        unsafe { *(&raw mut RTC_RETAINED) = state.encode() };
        info!("Power: retained AP channel {}", state.channel);
    }

    #[allow(unreachable_code)]
    fn deep_sleep(&mut self, secs: u32) -> ! {
        info!("Power: deep sleep for {}s", secs);
        // SAFETY: both calls are valid from any task; the second never returns.
        unsafe {
            esp_idf_svc::sys::esp_sleep_enable_timer_wakeup(u64::from(secs) * 1_000_000);
            esp_idf_svc::sys::esp_deep_sleep_start();
        }
        loop {}
    }

    #[allow(unreachable_code)]
    fn restart(&mut self) -> ! {
        info!("Power: restarting");
        // SAFETY: never returns.
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }
        loop {}
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
static SIM_RTC: std::sync::Mutex<[u8; RETAINED_LEN]> = std::sync::Mutex::new([0; RETAINED_LEN]);

#[cfg(not(target_os = "espidf"))]
pub struct PowerAdapter {
    reset: ResetReason,
}

#[cfg(not(target_os = "espidf"))]
impl PowerAdapter {
    pub fn new(reset: ResetReason) -> Self {
        Self { reset }
    }

    /// Fill simulated RTC memory as a power-on would.
    pub fn sim_clear_rtc() {
        if let Ok(mut rtc) = SIM_RTC.lock() {
            *rtc = [0; RETAINED_LEN];
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl PowerPort for PowerAdapter {
    fn reset_reason(&self) -> ResetReason {
        self.reset
    }

    fn read_retained(&self) -> Option<RetainedState> {
        let blob = *SIM_RTC.lock().ok()?;
        RetainedState::decode(&blob)
    }

    fn write_retained(&mut self, state: &RetainedState) {
        if let Ok(mut rtc) = SIM_RTC.lock() {
            *rtc = state.encode();
        }
    }

    fn deep_sleep(&mut self, secs: u32) -> ! {
        info!("Power(sim): deep sleep for {}s, exiting", secs);
        std::process::exit(0)
    }

    fn restart(&mut self) -> ! {
        info!("Power(sim): restart, exiting");
        std::process::exit(0)
    }
}
