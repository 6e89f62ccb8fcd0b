//! Port traits: the hexagonal boundary between the lifecycle core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ LifecycleController (domain)
//! ```
//!
//! Every external collaborator of a wake cycle (filesystem, HTTP/TLS client,
//! WiFi station, clock, power manager, OTA partition, time-series sink) is
//! reached through one of these traits.  The controller takes them as
//! trait objects bundled in [`Ports`], so host tests drive the full state
//! machine with recording mocks.
//!
//! All port calls are synchronous and run to completion (or to an internal
//! bound) before returning.

use embedded_hal::delay::DelayNs;

use crate::config::TelemetryEndpoint;
use crate::error::{NetworkError, OtaError, StorageError, TelemetryError};
use crate::retained::RetainedState;
use crate::telemetry::Point;

// ───────────────────────────────────────────────────────────────
// Persistent store (filesystem)
// ───────────────────────────────────────────────────────────────

/// File-level persistent storage for the configuration documents.
///
/// # Atomicity
///
/// `write` MUST replace the file atomically as observed through `read`:
/// after a power loss a read returns either the old or the new contents,
/// never a mix.  An adapter may finish an interrupted replace lazily on
/// the next read.
pub trait StoragePort {
    /// Read a whole file.
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Replace a whole file atomically.
    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Check whether a file exists without reading it.
    fn exists(&self, path: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Transport (HTTP over TLS)
// ───────────────────────────────────────────────────────────────

/// A fully buffered HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Only `200 OK` counts as success for the control-server protocol.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Block size a buffered body is replayed in by the default
/// [`TransportPort::get_streaming`].
pub const STREAM_BLOCK: usize = 1024;

/// Receiver for a response body that is too large to buffer.
pub trait BodySink {
    /// Status and headers, body empty.  Returning `false` skips the body.
    fn start(&mut self, head: &Response) -> bool;

    /// Next block of the body, in order.  Returning `false` stops the read.
    fn data(&mut self, block: &[u8]) -> bool;
}

/// Hand an already buffered response to `sink` as if it were arriving
/// off the wire.  A missing `Content-Length` is filled in from the body.
pub fn replay_buffered(mut resp: Response, sink: &mut dyn BodySink) -> Response {
    let body = core::mem::take(&mut resp.body);
    if resp.header("Content-Length").is_none() {
        resp.headers
            .push(("Content-Length".to_owned(), body.len().to_string()));
    }
    if sink.start(&resp) {
        for block in body.chunks(STREAM_BLOCK) {
            if !sink.data(block) {
                break;
            }
        }
    }
    resp
}

/// Blocking HTTP(S) client.
///
/// `get`/`post` buffer the whole body and are meant for small documents.
/// Firmware images go through [`get_streaming`](Self::get_streaming).
pub trait TransportPort {
    fn get(&mut self, url: &str, headers: &[(&str, &str)]) -> Result<Response, NetworkError>;

    /// GET with the body pushed into `sink` as it is read.  The returned
    /// response carries status and headers only.
    fn get_streaming(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        sink: &mut dyn BodySink,
    ) -> Result<Response, NetworkError> {
        let resp = self.get(url, headers)?;
        Ok(replay_buffered(resp, sink))
    }

    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Response, NetworkError>;
}

// ───────────────────────────────────────────────────────────────
// Connectivity (WiFi station)
// ───────────────────────────────────────────────────────────────

/// WiFi station control.  Association is started by [`begin`] and then
/// polled by the controller, which owns the retry budget.
///
/// [`begin`]: ConnectivityPort::begin
pub trait ConnectivityPort {
    /// Start associating.  `hint` carries the parameters retained from the
    /// previous cycle and may be used to skip the channel scan.
    fn begin(
        &mut self,
        ssid: &str,
        password: &str,
        hint: Option<&RetainedState>,
    ) -> Result<(), NetworkError>;

    /// True once associated *or* an IP address has been assigned.
    fn is_associated(&self) -> bool;

    /// Tear the link down, returning the parameters worth retaining.
    fn shutdown(&mut self) -> Option<RetainedState>;

    fn rssi(&self) -> Option<i8>;
}

// ───────────────────────────────────────────────────────────────
// Time (delays + NTP)
// ───────────────────────────────────────────────────────────────

/// Blocking delays plus wall-clock synchronisation.
pub trait TimePort: DelayNs {
    /// Kick off NTP synchronisation against `servers`.
    fn start_sync(&mut self, servers: &[&str]);

    /// Whether the wall clock has been set.
    fn is_synced(&self) -> bool;

    /// Seconds since the Unix epoch, once synced.
    fn unix_time(&self) -> Option<u64>;
}

// ───────────────────────────────────────────────────────────────
// Power manager
// ───────────────────────────────────────────────────────────────

/// Why the chip last came out of reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    PowerOn,
    /// Reset pin or an external supervisor.
    External,
    DeepSleepWake,
    Software,
    Watchdog,
    Panic,
    Brownout,
    Unknown,
}

impl ResetReason {
    /// Power-on and external resets mean a human touched the device; the
    /// node refreshes its configuration and firmware on those.
    pub fn forces_update(self) -> bool {
        matches!(self, Self::PowerOn | Self::External)
    }
}

/// Deep sleep, restart and the RTC-retained blob.
pub trait PowerPort {
    fn reset_reason(&self) -> ResetReason;

    /// Retained state from before the last sleep, if it survived.
    fn read_retained(&self) -> Option<RetainedState>;

    fn write_retained(&mut self, state: &RetainedState);

    /// Enter deep sleep.  Execution resumes at boot.
    fn deep_sleep(&mut self, secs: u32) -> !;

    /// Restart immediately.
    fn restart(&mut self) -> !;
}

// ───────────────────────────────────────────────────────────────
// Firmware image sink (OTA partition)
// ───────────────────────────────────────────────────────────────

/// Sequential writer for a new firmware image.
pub trait FirmwarePort {
    /// Open the inactive partition for an image of `size` bytes.
    fn begin(&mut self, size: u32) -> Result<(), OtaError>;

    /// Append a chunk; returns total bytes written so far.
    fn write(&mut self, chunk: &[u8]) -> Result<u32, OtaError>;

    /// Verify the image and mark it bootable.
    fn finalize(&mut self) -> Result<(), OtaError>;

    /// Drop the session.  Always leaves the port ready for a new `begin`.
    fn abort(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Telemetry sink (time-series write buffer)
// ───────────────────────────────────────────────────────────────

/// Buffered time-series writer.  Delivery is at-most-once per cycle.
pub trait TelemetrySink {
    /// Configure the endpoint and size the buffer for `batch_size` points
    /// per flush.
    fn open(
        &mut self,
        endpoint: &TelemetryEndpoint<'_>,
        batch_size: usize,
    ) -> Result<(), TelemetryError>;

    /// Append a point to the buffer.
    fn write_point(&mut self, point: &Point) -> Result<(), TelemetryError>;

    /// Send everything buffered.  The buffer is emptied either way.
    fn flush(&mut self) -> Result<(), TelemetryError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink
// ───────────────────────────────────────────────────────────────

/// The controller emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Port bundle
// ───────────────────────────────────────────────────────────────

/// Everything the controller touches during a tick.
pub struct Ports<'a> {
    pub storage: &'a mut dyn StoragePort,
    pub transport: &'a mut dyn TransportPort,
    pub wifi: &'a mut dyn ConnectivityPort,
    pub time: &'a mut dyn TimePort,
    pub power: &'a mut dyn PowerPort,
    pub firmware: &'a mut dyn FirmwarePort,
    pub telemetry: &'a mut dyn TelemetrySink,
    pub events: &'a mut dyn EventSink,
}
