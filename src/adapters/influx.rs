//! InfluxDB v2 telemetry sink.
//!
//! Implements [`TelemetrySink`] on top of any [`TransportPort`].  Points are
//! encoded to line protocol as they are written and held until
//! [`flush`](TelemetrySink::flush), which sends them in one
//! `POST /api/v2/write`.
//!
//! The buffer holds twice the batch size given to `open`, so one cycle's
//! worth of points always fits even if a sensor writes more than one.

use core::fmt::Write;

use log::{debug, info, warn};

use crate::app::ports::{TelemetrySink, TransportPort};
use crate::config::{TelemetryEndpoint, USER_AGENT};
use crate::error::TelemetryError;
use crate::telemetry::Point;

/// Write endpoint plus credentials, captured at `open`.
#[derive(Debug, Clone)]
struct Target {
    write_url: String,
    auth: String,
}

pub struct InfluxSink<T> {
    transport: T,
    target: Option<Target>,
    lines: Vec<String>,
    capacity: usize,
}

impl<T: TransportPort> InfluxSink<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            target: None,
            lines: Vec::new(),
            capacity: 0,
        }
    }

    pub fn buffered(&self) -> usize {
        self.lines.len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// `<url>/api/v2/write?org=..&bucket=..&precision=s`, query values
/// percent-encoded.
pub fn write_url(endpoint: &TelemetryEndpoint<'_>) -> String {
    let mut url = String::with_capacity(endpoint.url.len() + 64);
    url.push_str(endpoint.url.trim_end_matches('/'));
    url.push_str("/api/v2/write?org=");
    percent_encode_into(&mut url, endpoint.org);
    url.push_str("&bucket=");
    percent_encode_into(&mut url, endpoint.bucket);
    url.push_str("&precision=s");
    url
}

fn percent_encode_into(out: &mut String, s: &str) {
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
    }
}

impl<T: TransportPort> TelemetrySink for InfluxSink<T> {
    fn open(
        &mut self,
        endpoint: &TelemetryEndpoint<'_>,
        batch_size: usize,
    ) -> Result<(), TelemetryError> {
        self.capacity = batch_size.max(1) * 2;
        self.lines = Vec::with_capacity(self.capacity);
        self.target = Some(Target {
            write_url: write_url(endpoint),
            auth: format!("Token {}", endpoint.token),
        });
        info!(
            "Influx: sink open for bucket '{}' (buffer {} points)",
            endpoint.bucket, self.capacity
        );
        Ok(())
    }

    fn write_point(&mut self, point: &Point) -> Result<(), TelemetryError> {
        if self.target.is_none() {
            return Err(TelemetryError::NotOpen);
        }
        if self.lines.len() >= self.capacity {
            return Err(TelemetryError::BufferFull);
        }
        let line = point.to_line_protocol().ok_or(TelemetryError::InvalidPoint)?;
        debug!("Influx: + {}", line);
        self.lines.push(line);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        let Some(target) = self.target.as_ref() else {
            return Err(TelemetryError::NotOpen);
        };
        if self.lines.is_empty() {
            return Ok(());
        }
        let body = self.lines.join("\n");
        let count = self.lines.len();
        self.lines.clear();

        let headers = [
            ("Authorization", target.auth.as_str()),
            ("Content-Type", "text/plain; charset=utf-8"),
            ("User-Agent", USER_AGENT),
        ];
        match self.transport.post(&target.write_url, &headers, body.as_bytes()) {
            Ok(resp) if (200..300).contains(&resp.status) => {
                info!("Influx: wrote {} point(s)", count);
                Ok(())
            }
            Ok(resp) => {
                warn!(
                    "Influx: write of {} point(s) rejected (HTTP {})",
                    count, resp.status
                );
                Err(TelemetryError::FlushFailed)
            }
            Err(e) => {
                warn!("Influx: write of {} point(s) failed: {}", count, e);
                Err(TelemetryError::FlushFailed)
            }
        }
    }
}
