//! Configuration documents and firmware-wide constants.
//!
//! Two JSON documents drive a wake cycle:
//!
//! - **global** (`/global_config.json`): credentials and endpoints shared by
//!   every node in a deployment, versioned by `global_config_version`.
//! - **local** (`/config.json`): this node's name, sleep period and sensor
//!   list, versioned by `config_version`.
//!
//! Every field carries a `serde` default so a sparse document still parses;
//! a document with the wrong shape or field types does not.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SensorError;

// --- Persisted paths ---
pub const GLOBAL_CONFIG_PATH: &str = "/global_config.json";
pub const LOCAL_CONFIG_PATH: &str = "/config.json";

// --- Firmware identity ---
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const USER_AGENT: &str = "sensornode-OTA";

// --- Connectivity ---
/// Association polls before giving up (~100 s at 100 ms spacing).
pub const ASSOCIATION_POLLS: u32 = 1000;
pub const ASSOCIATION_POLL_INTERVAL_MS: u32 = 100;
/// Spacing between clock-sync checks.  The wait itself is unbounded.
pub const CLOCK_SYNC_POLL_INTERVAL_MS: u32 = 500;
pub const NTP_SERVERS: [&str; 2] = ["pool.ntp.org", "time.nist.gov"];
pub const HTTP_TIMEOUT_MS: u32 = 20_000;

// --- Control server ---
/// Shortest control URL that can possibly be valid (`https://a.b`).
pub const MIN_CONTROL_URL_LEN: usize = 11;
pub const API_PREFIX: &str = "/api/v1";

/// Sleep period used when no local document exists.
pub const UNCONFIGURED_SLEEP_SECS: u32 = 600;

/// Chip identity as sent to the control server, e.g. `0x00efcafe`.
pub type ChipId = heapless::String<16>;

// ───────────────────────────────────────────────────────────────
// Global document
// ───────────────────────────────────────────────────────────────

/// Deployment-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Shared key sent back to the control server with global fetches.
    pub global_config_key: String,
    pub global_config_version: u32,

    pub wifi_ssid: String,
    pub wifi_pass: String,

    /// Control server base URL (scheme + authority only after normalisation).
    pub ctrl_url: String,

    // --- Telemetry endpoint ---
    pub influx_url: String,
    pub influx_org: String,
    pub influx_bucket: String,
    pub influx_token: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            global_config_key: "ABCDEF".into(),
            global_config_version: 0,
            wifi_ssid: "NO SSID".into(),
            wifi_pass: "NO PSK".into(),
            ctrl_url: "https://example.com".into(),
            influx_url: "https://example.com".into(),
            influx_org: "influx org".into(),
            influx_bucket: "sensor_bucket".into(),
            influx_token: "ABCDEFG".into(),
        }
    }
}

/// Borrowed view of the telemetry endpoint credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryEndpoint<'a> {
    pub url: &'a str,
    pub org: &'a str,
    pub bucket: &'a str,
    pub token: &'a str,
}

impl GlobalConfig {
    /// Strip any path from the control URL, keeping scheme and authority.
    ///
    /// The search for `/` starts at byte 8 so the `//` of the scheme is
    /// never matched.
    pub fn normalize(&mut self) {
        if let Some(idx) = self.ctrl_url.get(8..).and_then(|rest| rest.find('/')) {
            self.ctrl_url.truncate(8 + idx);
        }
    }

    /// `<ctrl_url>/api/v1`, or `None` when the control URL is unusable.
    pub fn api_base(&self) -> Option<String> {
        if self.ctrl_url.len() < MIN_CONTROL_URL_LEN {
            return None;
        }
        Some(format!("{}{}", self.ctrl_url, API_PREFIX))
    }

    pub fn telemetry_endpoint(&self) -> TelemetryEndpoint<'_> {
        TelemetryEndpoint {
            url: &self.influx_url,
            org: &self.influx_org,
            bucket: &self.influx_bucket,
            token: &self.influx_token,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Local document
// ───────────────────────────────────────────────────────────────

/// Per-node settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Display name; the chip id is used when absent.
    pub device_name: Option<String>,
    pub sleep_time_s: u32,
    pub config_version: u32,
    /// Ordered sensor list; order is the sampling and publishing order.
    pub sensors: Vec<SensorDescriptor>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            sleep_time_s: 60,
            config_version: 0,
            sensors: Vec::new(),
        }
    }
}

impl LocalConfig {
    pub fn device_name_or<'a>(&'a self, chip_id: &'a str) -> &'a str {
        self.device_name.as_deref().unwrap_or(chip_id)
    }
}

// ───────────────────────────────────────────────────────────────
// Sensor descriptor
// ───────────────────────────────────────────────────────────────

/// One entry of the local `sensors` array: a type plus opaque parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorDescriptor {
    /// Sensor kind, matched case-insensitively against the registry.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Everything else in the object, interpreted by the sensor factory.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl SensorDescriptor {
    /// Build a descriptor from a kind and a JSON object of parameters.
    pub fn new(kind: &str, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            kind: Some(kind.to_owned()),
            params,
        }
    }

    /// Numeric parameter; `Ok(None)` when absent, an error when mistyped.
    pub fn param_f32(&self, key: &'static str) -> Result<Option<f32>, SensorError> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(|v| Some(v as f32))
                .ok_or(SensorError::InvalidParameter(key)),
            Some(_) => Err(SensorError::InvalidParameter(key)),
        }
    }

    /// Unsigned integer parameter; `Ok(None)` when absent.
    pub fn param_u32(&self, key: &'static str) -> Result<Option<u32>, SensorError> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Some)
                .ok_or(SensorError::InvalidParameter(key)),
            Some(_) => Err(SensorError::InvalidParameter(key)),
        }
    }

    /// String parameter; `Ok(None)` when absent.
    pub fn param_str(&self, key: &'static str) -> Result<Option<&str>, SensorError> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(SensorError::InvalidParameter(key)),
        }
    }
}
