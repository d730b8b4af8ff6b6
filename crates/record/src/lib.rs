//! The normalized log record shared by every component.
//!
//! The syslog listeners parse wire bytes into a tagged [`ParsedMessage`];
//! the ingest worker normalizes that into a [`LogRecord`], which is what the
//! sinks, the datastore and the WebSocket hub all exchange. Records are
//! value objects: produced once, fanned out, then dropped.

mod facility;
mod message;
mod severity;

pub use facility::Facility;
pub use message::{LogRecord, NormalizeError, ParsedMessage, Rfc3164Message, Rfc5424Message};
pub use severity::Severity;

/// RFC flavor a record was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RfcVersion {
    #[serde(rename = "rfc3164")]
    Rfc3164,
    #[serde(rename = "rfc5424")]
    Rfc5424,
}

impl std::fmt::Display for RfcVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RfcVersion::Rfc3164 => f.write_str("rfc3164"),
            RfcVersion::Rfc5424 => f.write_str("rfc5424"),
        }
    }
}
