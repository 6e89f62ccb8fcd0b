//! Telemetry points and their InfluxDB line-protocol encoding.
//!
//! Sensors describe their readings as [`Point`]s; the sink adapter decides
//! how and when they leave the device.

use core::fmt::Write;

/// A single field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    Bool(bool),
}

/// One measurement: name, tag set, field set.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, FieldValue)>,
    /// Unix seconds; `None` lets the server assign the write time.
    pub timestamp: Option<u64>,
}

impl Point {
    pub fn new(measurement: &str) -> Self {
        Self {
            measurement: measurement.to_owned(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp: None,
        }
    }

    #[must_use]
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.to_owned(), value.to_owned()));
        self
    }

    #[must_use]
    pub fn field(mut self, key: &str, value: FieldValue) -> Self {
        self.fields.push((key.to_owned(), value));
        self
    }

    #[must_use]
    pub fn at(mut self, unix_secs: u64) -> Self {
        self.timestamp = Some(unix_secs);
        self
    }

    /// Encode as one line of InfluxDB line protocol (no trailing newline).
    ///
    /// Returns `None` for a point without fields or with a non-finite float,
    /// neither of which the protocol can express.
    pub fn to_line_protocol(&self) -> Option<String> {
        if self.fields.is_empty() || self.measurement.is_empty() {
            return None;
        }
        let mut line = String::with_capacity(64);
        escape_into(&mut line, &self.measurement, &[',', ' ']);

        // Tags are sorted by key, as the server prefers.
        let mut tags: Vec<&(String, String)> =
            self.tags.iter().filter(|(k, v)| !k.is_empty() && !v.is_empty()).collect();
        tags.sort_by(|a, b| a.0.cmp(&b.0));
        for (k, v) in tags {
            line.push(',');
            escape_into(&mut line, k, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, v, &[',', '=', ' ']);
        }

        for (i, (k, v)) in self.fields.iter().enumerate() {
            line.push(if i == 0 { ' ' } else { ',' });
            escape_into(&mut line, k, &[',', '=', ' ']);
            line.push('=');
            match *v {
                FieldValue::Float(f) if !f.is_finite() => return None,
                FieldValue::Float(f) => {
                    let _ = write!(line, "{f}");
                }
                FieldValue::Int(n) => {
                    let _ = write!(line, "{n}i");
                }
                FieldValue::Bool(b) => line.push_str(if b { "true" } else { "false" }),
            }
        }

        if let Some(ts) = self.timestamp {
            let _ = write!(line, " {ts}");
        }
        Some(line)
    }
}

fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}
