//! SensorNode firmware entry point.
//!
//! One process lifetime is one wake cycle:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │  FsAdapter   HttpAdapter   WifiAdapter   ClockAdapter          │
//! │  PowerAdapter   OtaAdapter   InfluxSink   LogEventSink         │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │        LifecycleController (pure logic)                │    │
//! │  │  FSM · ConfigStore · SensorSampler                     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The controller returns how the cycle ends; `main` then restarts or
//! deep-sleeps and never returns.

use anyhow::Result;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;
use log::{info, warn};

use sensornode::adapters::device_id;
use sensornode::adapters::fs::FsAdapter;
use sensornode::adapters::http::HttpAdapter;
use sensornode::adapters::influx::InfluxSink;
use sensornode::adapters::log_sink::LogEventSink;
use sensornode::adapters::ota::{self, OtaAdapter};
use sensornode::adapters::power::PowerAdapter;
use sensornode::adapters::time::ClockAdapter;
use sensornode::adapters::wifi::WifiAdapter;
use sensornode::app::ports::{PowerPort, Ports};
use sensornode::app::service::{LifecycleController, Terminal};
use sensornode::config::{FIRMWARE_VERSION, UNCONFIGURED_SLEEP_SECS};
use sensornode::sensors::registry;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("SensorNode v{} (package {})", FIRMWARE_VERSION, env!("CARGO_PKG_VERSION"));

    // Reaching main means the image boots; cancel any pending rollback.
    ota::check_rollback();

    let mut power = PowerAdapter::new();

    // ── 2. Storage ────────────────────────────────────────────
    let mut storage = match FsAdapter::mount() {
        Ok(fs) => fs,
        Err(e) => {
            // Without storage there is nothing to sample; try again later.
            log::error!("FS mount failed ({}), sleeping", e);
            power.deep_sleep(UNCONFIGURED_SLEEP_SECS);
        }
    };

    // ── 3. Radio and the rest of the adapters ─────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = match EspDefaultNvsPartition::take() {
        Ok(nvs) => Some(nvs),
        Err(e) => {
            warn!("NVS unavailable ({}), WiFi runs without calibration cache", e);
            None
        }
    };
    let mut wifi = WifiAdapter::new(EspWifi::new(peripherals.modem, sysloop, nvs)?);

    let mut transport = HttpAdapter::new();
    let mut telemetry = InfluxSink::new(HttpAdapter::new());
    let mut clock = ClockAdapter::new();
    let mut firmware = OtaAdapter::new();
    let mut events = LogEventSink::new();

    let chip_id = device_id::chip_id(&device_id::read_mac());
    info!("Chip ID: {}", chip_id);

    // ── 4. Wake cycle ─────────────────────────────────────────
    let registry = registry::bootstrap();
    let mut controller = LifecycleController::new(chip_id, &registry);

    let terminal = {
        let mut ports = Ports {
            storage: &mut storage,
            transport: &mut transport,
            wifi: &mut wifi,
            time: &mut clock,
            power: &mut power,
            firmware: &mut firmware,
            telemetry: &mut telemetry,
            events: &mut events,
        };
        controller.run(&mut ports)
    };

    // ── 5. Hand over to the power manager ─────────────────────
    match terminal {
        Terminal::Reboot => power.restart(),
        Terminal::Sleep { secs } => power.deep_sleep(secs),
    }
}
