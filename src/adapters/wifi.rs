//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`].  `begin` validates the credentials and
//! starts a non-blocking connect; the controller then polls
//! `is_associated` under its own budget.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::EspWifi` in STA mode.
//!   A retained BSSID/channel pins the connect to the known AP and skips
//!   the full scan.
//! - **all other targets**: simulation that associates after a
//!   configurable number of polls (or never).

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::ConnectivityPort;
use crate::error::NetworkError;
use crate::retained::RetainedState;

use super::utils::is_printable_ascii;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn validate_ssid(ssid: &str) -> Result<(), NetworkError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(NetworkError::InvalidCredentials);
    }
    Ok(())
}

/// Empty for open networks, otherwise 8–64 bytes (WPA2).
fn validate_password(password: &str) -> Result<(), NetworkError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(NetworkError::InvalidCredentials);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WifiAdapter {
    wifi: esp_idf_svc::wifi::EspWifi<'static>,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    pub fn new(wifi: esp_idf_svc::wifi::EspWifi<'static>) -> Self {
        Self { wifi }
    }

    fn ap_record() -> Option<esp_idf_svc::sys::wifi_ap_record_t> {
        let mut ap: esp_idf_svc::sys::wifi_ap_record_t = Default::default();
        // SAFETY: only called while the STA is started; `ap` is a valid
        // out-parameter for the duration of the call.
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap) };
        (ret == esp_idf_svc::sys::ESP_OK).then_some(ap)
    }
}

#[cfg(target_os = "espidf")]
impl ConnectivityPort for WifiAdapter {
    fn begin(
        &mut self,
        ssid: &str,
        password: &str,
        hint: Option<&RetainedState>,
    ) -> Result<(), NetworkError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        validate_ssid(ssid)?;
        validate_password(password)?;

        let client = ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| NetworkError::InvalidCredentials)?,
            password: password
                .try_into()
                .map_err(|_| NetworkError::InvalidCredentials)?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            bssid: hint.map(|h| h.bssid),
            channel: hint.map(|h| h.channel),
            ..Default::default()
        };
        self.wifi
            .set_configuration(&Configuration::Client(client))
            .map_err(|_| NetworkError::ConnectFailed)?;
        self.wifi.start().map_err(|_| NetworkError::ConnectFailed)?;
        self.wifi.connect().map_err(|_| NetworkError::ConnectFailed)?;
        info!(
            "WiFi: connecting to '{}'{}",
            ssid,
            if hint.is_some() { " (retained AP)" } else { "" }
        );
        Ok(())
    }

    fn is_associated(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
            || self.wifi.sta_netif().is_up().unwrap_or(false)
    }

    fn shutdown(&mut self) -> Option<RetainedState> {
        let retained = Self::ap_record().map(|ap| RetainedState {
            bssid: ap.bssid,
            channel: ap.primary,
        });
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi: disconnect failed: {}", e);
        }
        if let Err(e) = self.wifi.stop() {
            warn!("WiFi: stop failed: {}", e);
        }
        info!("WiFi: down");
        retained
    }

    fn rssi(&self) -> Option<i8> {
        Self::ap_record().map(|ap| ap.rssi)
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

/// Access point the simulated station associates with.
#[cfg(not(target_os = "espidf"))]
pub const SIM_AP: RetainedState = RetainedState {
    bssid: [0x24, 0x0A, 0xC4, 0x00, 0x00, 0x01],
    channel: 6,
};

#[cfg(not(target_os = "espidf"))]
pub struct WifiAdapter {
    /// Polls until association; `None` never associates.
    associate_after: Option<u32>,
    polls: core::cell::Cell<u32>,
    started: bool,
    used_hint: bool,
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    pub fn new(associate_after: Option<u32>) -> Self {
        Self {
            associate_after,
            polls: core::cell::Cell::new(0),
            started: false,
            used_hint: false,
        }
    }

    /// Whether the last `begin` was given retained parameters.
    pub fn used_hint(&self) -> bool {
        self.used_hint
    }
}

#[cfg(not(target_os = "espidf"))]
impl ConnectivityPort for WifiAdapter {
    fn begin(
        &mut self,
        ssid: &str,
        password: &str,
        hint: Option<&RetainedState>,
    ) -> Result<(), NetworkError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.started = true;
        self.used_hint = hint.is_some();
        self.polls.set(0);
        info!("WiFi(sim): connecting to '{}'", ssid);
        Ok(())
    }

    fn is_associated(&self) -> bool {
        if !self.started {
            return false;
        }
        let n = self.polls.get().saturating_add(1);
        self.polls.set(n);
        self.associate_after.is_some_and(|after| n >= after)
    }

    fn shutdown(&mut self) -> Option<RetainedState> {
        let was_up = self.started && self.is_associated();
        self.started = false;
        info!("WiFi(sim): down");
        was_up.then_some(SIM_AP)
    }

    fn rssi(&self) -> Option<i8> {
        self.started.then_some(-60)
    }
}
