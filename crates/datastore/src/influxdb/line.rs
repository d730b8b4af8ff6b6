//! Line-protocol points and escaping.
//!
//! One point per record: the app name is the measurement, hostname /
//! severity / facility are tags (severity and facility as their numeric
//! strings), and the log text is the single `message` field.

use chrono::{DateTime, Utc};
use coriolis_record::LogRecord;

/// A point awaiting flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    pub measurement: String,
    pub hostname: String,
    pub severity: String,
    pub facility: String,
    pub message: String,
    pub timestamp_ns: i64,
}

impl Point {
    pub fn from_record(record: &LogRecord) -> Self {
        Self {
            measurement: record.app_name.clone(),
            hostname: record.hostname.clone(),
            severity: record.severity.to_string(),
            facility: record.facility.to_string(),
            message: record.message.clone(),
            timestamp_ns: timestamp_ns(&record.timestamp),
        }
    }

    /// Render as one line of InfluxDB line protocol. Tag keys are emitted
    /// in lexical order.
    pub fn to_line(&self) -> String {
        format!(
            "{},facility={},hostname={},severity={} message=\"{}\" {}",
            escape_measurement(&self.measurement),
            escape_tag(&self.facility),
            escape_tag(&self.hostname),
            escape_tag(&self.severity),
            escape_field(&self.message),
            self.timestamp_ns
        )
    }
}

/// Join a batch into a newline-separated write body.
pub fn encode_batch(points: &[Point]) -> String {
    let mut body = String::with_capacity(points.len() * 64);
    for point in points {
        body.push_str(&point.to_line());
        body.push('\n');
    }
    body
}

/// Nanoseconds since the epoch, saturating for timestamps outside the
/// representable range (year 2262).
pub fn timestamp_ns(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt()
        .unwrap_or_else(|| ts.timestamp_millis().saturating_mul(1_000_000))
}

/// Measurements escape commas and spaces.
fn escape_measurement(s: &str) -> String {
    escape(s, &[',', ' '])
}

/// Tag keys and values escape commas, equals signs and spaces.
fn escape_tag(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

/// String field values escape backslashes and double quotes.
fn escape_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// Double-quoted identifiers in InfluxQL escape embedded double quotes.
pub fn escape_identifier(s: &str) -> String {
    s.replace('"', "\\\"")
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
