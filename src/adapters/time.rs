//! Clock adapter: blocking delays and NTP wall-clock sync.
//!
//! - **`target_os = "espidf"`**: `esp_idf_hal::delay::FreeRtos` for the
//!   delays, `esp_idf_svc::sntp::EspSntp` for synchronisation and
//!   `gettimeofday` for the wall clock.
//! - **`not(target_os = "espidf")`**: simulated clock: delays advance a
//!   counter instead of sleeping and sync completes after a configurable
//!   number of checks.

use embedded_hal::delay::DelayNs;
use log::info;

use crate::app::ports::TimePort;

/// Any wall-clock reading before 2020-01-01 means the clock is unset.
pub const EPOCH_2020: u64 = 1_577_836_800;

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct ClockAdapter {
    sntp: Option<esp_idf_svc::sntp::EspSntp<'static>>,
}

#[cfg(target_os = "espidf")]
impl ClockAdapter {
    pub fn new() -> Self {
        Self { sntp: None }
    }
}

#[cfg(target_os = "espidf")]
impl DelayNs for ClockAdapter {
    fn delay_ns(&mut self, ns: u32) {
        esp_idf_hal::delay::FreeRtos.delay_ns(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }
}

#[cfg(target_os = "espidf")]
impl TimePort for ClockAdapter {
    fn start_sync(&mut self, servers: &[&str]) {
        use esp_idf_svc::sntp::{EspSntp, SntpConf};

        let mut conf = SntpConf::default();
        for (slot, server) in conf.servers.iter_mut().zip(servers) {
            *slot = *server;
        }
        match EspSntp::new(&conf) {
            Ok(sntp) => {
                info!("Clock: SNTP started ({} server(s))", servers.len());
                self.sntp = Some(sntp);
            }
            Err(e) => log::warn!("Clock: SNTP start failed: {}", e),
        }
    }

    fn is_synced(&self) -> bool {
        use esp_idf_svc::sntp::SyncStatus;

        self.sntp
            .as_ref()
            .is_some_and(|s| s.get_sync_status() == SyncStatus::Completed)
            || self.unix_time().is_some()
    }

    fn unix_time(&self) -> Option<u64> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: `tv` is a valid out-parameter; a null timezone is allowed.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        let secs = u64::try_from(tv.tv_sec).ok()?;
        (secs >= EPOCH_2020).then_some(secs)
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub struct ClockAdapter {
    /// Checks of `is_synced` before it reports true.
    sync_after: u32,
    checks: core::cell::Cell<u32>,
    sync_started: bool,
    slept_ms: u64,
    base_unix: u64,
}

#[cfg(not(target_os = "espidf"))]
impl ClockAdapter {
    pub fn new(sync_after: u32) -> Self {
        Self {
            sync_after,
            checks: core::cell::Cell::new(0),
            sync_started: false,
            slept_ms: 0,
            base_unix: 1_700_000_000,
        }
    }

    /// Total simulated delay so far.
    pub fn slept_ms(&self) -> u64 {
        self.slept_ms
    }
}

#[cfg(not(target_os = "espidf"))]
impl DelayNs for ClockAdapter {
    fn delay_ns(&mut self, ns: u32) {
        self.slept_ms += u64::from(ns) / 1_000_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.slept_ms += u64::from(ms);
    }
}

#[cfg(not(target_os = "espidf"))]
impl TimePort for ClockAdapter {
    fn start_sync(&mut self, servers: &[&str]) {
        info!("Clock(sim): sync against {:?}", servers);
        self.sync_started = true;
    }

    fn is_synced(&self) -> bool {
        if !self.sync_started {
            return false;
        }
        let n = self.checks.get().saturating_add(1);
        self.checks.set(n);
        n > self.sync_after
    }

    fn unix_time(&self) -> Option<u64> {
        (self.sync_started && self.checks.get() > self.sync_after)
            .then(|| self.base_unix + self.slept_ms / 1000)
    }
}
