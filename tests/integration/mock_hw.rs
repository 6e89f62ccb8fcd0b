//! Recording mocks for every port the lifecycle controller drives.
//!
//! [`Rig`] owns one of each and hands out a [`Ports`] bundle, so a test
//! can run a cycle and then inspect what each collaborator saw.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};

use embedded_hal::delay::DelayNs;
use sensornode::app::events::AppEvent;
use sensornode::app::ports::{
    ConnectivityPort, EventSink, FirmwarePort, Ports, PowerPort, ResetReason, Response,
    StoragePort, TelemetrySink, TimePort, TransportPort,
};
use sensornode::config::{SensorDescriptor, TelemetryEndpoint};
use sensornode::error::{NetworkError, OtaError, SensorError, StorageError, TelemetryError};
use sensornode::retained::RetainedState;
use sensornode::sensors::registry::SensorRegistry;
use sensornode::sensors::{PublishContext, SensorInstance, SensorState};
use sensornode::telemetry::{FieldValue, Point};

// ── Storage ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStorage {
    pub files: BTreeMap<String, Vec<u8>>,
    pub writes: Vec<String>,
}

impl MemStorage {
    pub fn with(mut self, path: &str, doc: &str) -> Self {
        self.files.insert(path.to_owned(), doc.as_bytes().to_vec());
        self
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.files
            .get(path)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

impl StoragePort for MemStorage {
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.files.get(path).cloned().ok_or(StorageError::NotFound)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        self.writes.push(path.to_owned());
        self.files.insert(path.to_owned(), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

// ── Transport ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Routes by exact URL; unknown URLs answer 404.
#[derive(Default)]
pub struct RoutedTransport {
    pub routes: HashMap<String, Response>,
    pub requests: Vec<Request>,
}

impl RoutedTransport {
    pub fn route(mut self, url: &str, resp: Response) -> Self {
        self.routes.insert(url.to_owned(), resp);
        self
    }

    pub fn urls(&self) -> Vec<&str> {
        self.requests.iter().map(|r| r.url.as_str()).collect()
    }

    fn record(&mut self, url: &str, headers: &[(&str, &str)]) -> Response {
        self.requests.push(Request {
            url: url.to_owned(),
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        });
        self.routes
            .get(url)
            .cloned()
            .unwrap_or_else(|| Response::new(404, Vec::new()))
    }
}

impl TransportPort for RoutedTransport {
    fn get(&mut self, url: &str, headers: &[(&str, &str)]) -> Result<Response, NetworkError> {
        Ok(self.record(url, headers))
    }

    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        _body: &[u8],
    ) -> Result<Response, NetworkError> {
        Ok(self.record(url, headers))
    }
}

// ── WiFi ──────────────────────────────────────────────────────

pub const MOCK_AP: RetainedState = RetainedState {
    bssid: [0x10, 0x20, 0x30, 0x40, 0x50, 0x60],
    channel: 11,
};

pub struct MockWifi {
    /// Polls until association; `None` never associates.
    pub associate_after: Option<u32>,
    pub polls: Cell<u32>,
    pub begins: Vec<(String, Option<RetainedState>)>,
    pub shutdowns: u32,
}

impl MockWifi {
    pub fn reachable() -> Self {
        Self::new(Some(3))
    }

    pub fn unreachable() -> Self {
        Self::new(None)
    }

    fn new(associate_after: Option<u32>) -> Self {
        Self {
            associate_after,
            polls: Cell::new(0),
            begins: Vec::new(),
            shutdowns: 0,
        }
    }
}

impl ConnectivityPort for MockWifi {
    fn begin(
        &mut self,
        ssid: &str,
        _password: &str,
        hint: Option<&RetainedState>,
    ) -> Result<(), NetworkError> {
        self.begins.push((ssid.to_owned(), hint.copied()));
        self.polls.set(0);
        Ok(())
    }

    fn is_associated(&self) -> bool {
        let n = self.polls.get() + 1;
        self.polls.set(n);
        self.associate_after.is_some_and(|after| n >= after)
    }

    fn shutdown(&mut self) -> Option<RetainedState> {
        self.shutdowns += 1;
        Some(MOCK_AP)
    }

    fn rssi(&self) -> Option<i8> {
        Some(-55)
    }
}

// ── Clock ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockClock {
    pub slept_ms: u64,
    pub sync_started: bool,
}

impl DelayNs for MockClock {
    fn delay_ns(&mut self, ns: u32) {
        self.slept_ms += u64::from(ns) / 1_000_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.slept_ms += u64::from(ms);
    }
}

impl TimePort for MockClock {
    fn start_sync(&mut self, _servers: &[&str]) {
        self.sync_started = true;
    }

    fn is_synced(&self) -> bool {
        self.sync_started
    }

    fn unix_time(&self) -> Option<u64> {
        self.sync_started.then_some(1_750_000_000)
    }
}

// ── Power ─────────────────────────────────────────────────────

pub struct MockPower {
    pub reset: ResetReason,
    pub retained: Option<RetainedState>,
    pub retained_writes: Vec<RetainedState>,
}

impl MockPower {
    pub fn new(reset: ResetReason) -> Self {
        Self {
            reset,
            retained: None,
            retained_writes: Vec::new(),
        }
    }
}

impl PowerPort for MockPower {
    fn reset_reason(&self) -> ResetReason {
        self.reset
    }

    fn read_retained(&self) -> Option<RetainedState> {
        self.retained
    }

    fn write_retained(&mut self, state: &RetainedState) {
        self.retained_writes.push(*state);
        self.retained = Some(*state);
    }

    fn deep_sleep(&mut self, secs: u32) -> ! {
        panic!("controller must not sleep by itself ({secs}s)");
    }

    fn restart(&mut self) -> ! {
        panic!("controller must not restart by itself");
    }
}

// ── Firmware ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MockFirmware {
    pub begun: Option<u32>,
    pub chunks: Vec<usize>,
    pub finalized: bool,
    pub aborted: bool,
}

impl MockFirmware {
    pub fn written(&self) -> usize {
        self.chunks.iter().sum()
    }
}

impl FirmwarePort for MockFirmware {
    fn begin(&mut self, size: u32) -> Result<(), OtaError> {
        self.begun = Some(size);
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<u32, OtaError> {
        self.chunks.push(chunk.len());
        Ok(self.written() as u32)
    }

    fn finalize(&mut self) -> Result<(), OtaError> {
        self.finalized = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

// ── Telemetry ─────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub opened: Option<(String, usize)>,
    pub points: Vec<Point>,
    pub flushes: u32,
    pub fail_flush: bool,
}

impl TelemetrySink for RecordingSink {
    fn open(
        &mut self,
        endpoint: &TelemetryEndpoint<'_>,
        batch_size: usize,
    ) -> Result<(), TelemetryError> {
        self.opened = Some((endpoint.bucket.to_owned(), batch_size));
        Ok(())
    }

    fn write_point(&mut self, point: &Point) -> Result<(), TelemetryError> {
        if self.opened.is_none() {
            return Err(TelemetryError::NotOpen);
        }
        self.points.push(point.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        self.flushes += 1;
        if self.fail_flush {
            Err(TelemetryError::FlushFailed)
        } else {
            Ok(())
        }
    }
}

// ── Events ────────────────────────────────────────────────────

#[derive(Default)]
pub struct EventLog {
    pub events: Vec<AppEvent>,
}

impl EventLog {
    pub fn contains(&self, pred: impl Fn(&AppEvent) -> bool) -> bool {
        self.events.iter().any(pred)
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Sensors ───────────────────────────────────────────────────

/// Deterministic sensor: warms up for `warmup` polls, then latches
/// `ValueReadyForUpload` or `NoUpdate` depending on `report`.
#[derive(Debug)]
pub struct MockSensor {
    pub name: String,
    pub warmup: u32,
    pub report: bool,
    pub value: f64,
    pub polls: u32,
}

impl SensorInstance for MockSensor {
    fn sample(&mut self) -> SensorState {
        self.polls += 1;
        if self.polls <= self.warmup {
            SensorState::Initializing
        } else if self.report {
            SensorState::ValueReadyForUpload
        } else {
            SensorState::NoUpdate
        }
    }

    fn publish(
        &self,
        sink: &mut dyn TelemetrySink,
        ctx: &PublishContext<'_>,
    ) -> Result<(), TelemetryError> {
        let point = ctx
            .point("mock", &self.name)
            .field("value", FieldValue::Float(self.value));
        sink.write_point(&point)
    }
}

fn make_mock(desc: &SensorDescriptor) -> Result<MockSensor, SensorError> {
    Ok(MockSensor {
        name: desc.param_str("name")?.unwrap_or("mock").to_owned(),
        warmup: desc.param_u32("warmup_ticks")?.unwrap_or(0),
        report: desc.param_u32("report")?.unwrap_or(0) != 0,
        value: f64::from(desc.param_f32("value")?.unwrap_or(0.0)),
        polls: 0,
    })
}

/// Registry knowing only the `"mock"` kind.
pub fn mock_registry() -> SensorRegistry<MockSensor> {
    let mut r = SensorRegistry::new();
    r.register("mock", make_mock);
    r
}

// ── Rig ───────────────────────────────────────────────────────

pub struct Rig {
    pub storage: MemStorage,
    pub transport: RoutedTransport,
    pub wifi: MockWifi,
    pub clock: MockClock,
    pub power: MockPower,
    pub firmware: MockFirmware,
    pub telemetry: RecordingSink,
    pub events: EventLog,
}

impl Rig {
    pub fn new(reset: ResetReason, storage: MemStorage, wifi: MockWifi) -> Self {
        Self {
            storage,
            transport: RoutedTransport::default(),
            wifi,
            clock: MockClock::default(),
            power: MockPower::new(reset),
            firmware: MockFirmware::default(),
            telemetry: RecordingSink::default(),
            events: EventLog::default(),
        }
    }

    pub fn ports(&mut self) -> Ports<'_> {
        Ports {
            storage: &mut self.storage,
            transport: &mut self.transport,
            wifi: &mut self.wifi,
            time: &mut self.clock,
            power: &mut self.power,
            firmware: &mut self.firmware,
            telemetry: &mut self.telemetry,
            events: &mut self.events,
        }
    }
}

// ── Documents ─────────────────────────────────────────────────

pub const GLOBAL_DOC: &str = r#"{
    "global_config_key": "K3Y",
    "global_config_version": 4,
    "wifi_ssid": "FieldNet",
    "wifi_pass": "fieldpass",
    "ctrl_url": "https://ctrl.example.net",
    "influx_url": "https://influx.example.net",
    "influx_org": "farm",
    "influx_bucket": "greenhouse",
    "influx_token": "tok"
}"#;
