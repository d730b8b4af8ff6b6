//! The normalized record and the parsed-message variants it is built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Facility, RfcVersion, Severity};

/// A syslog message as it came off the wire, keyed by the RFC it was
/// parsed against. Normalization into a [`LogRecord`] is fail-fast: a
/// variant missing a required field never leaves the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMessage {
    Rfc3164(Rfc3164Message),
    Rfc5424(Rfc5424Message),
}

/// Fields of a BSD-style (RFC 3164) message.
///
/// The wire timestamp is parsed but intentionally not used for the record:
/// RFC 3164 timestamps carry no year and are unreliable, so normalization
/// stamps the record with the receipt time instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rfc3164Message {
    pub priority: u8,
    pub timestamp: Option<DateTime<Utc>>,
    pub hostname: String,
    pub tag: String,
    pub content: String,
}

/// Fields of an IETF (RFC 5424) message. Nil fields (`-`) are empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rfc5424Message {
    pub priority: u8,
    pub timestamp: Option<DateTime<Utc>>,
    pub hostname: String,
    pub app_name: String,
    pub proc_id: String,
    pub msg_id: String,
    pub message: String,
}

/// The canonical normalized log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub priority: u8,
    pub facility: Facility,
    pub severity: Severity,
    /// The logical stream key: one measurement per application.
    pub app_name: String,
    pub proc_id: i32,
    pub message: String,
    pub rfc: RfcVersion,
}

/// A parsed message that cannot become a persistable record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("invalid priority {0}, expected 0..=191")]
    InvalidPriority(u8),

    /// The app name (RFC 5424) or tag (RFC 3164) is the measurement key;
    /// a record without one cannot be stored.
    #[error("message has no app name")]
    MissingAppName,
}

impl ParsedMessage {
    /// Normalize into a [`LogRecord`], stamping `received_at` where the wire
    /// timestamp is absent or untrustworthy.
    pub fn into_record(self, received_at: DateTime<Utc>) -> Result<LogRecord, NormalizeError> {
        match self {
            ParsedMessage::Rfc3164(msg) => {
                let (facility, severity) = split_priority(msg.priority)?;
                if msg.tag.is_empty() {
                    return Err(NormalizeError::MissingAppName);
                }
                Ok(LogRecord {
                    // RFC 3164 wire timestamps have no year; use receipt time.
                    timestamp: received_at,
                    hostname: msg.hostname,
                    priority: msg.priority,
                    facility,
                    severity,
                    app_name: msg.tag,
                    proc_id: 0,
                    message: msg.content,
                    rfc: RfcVersion::Rfc3164,
                })
            }
            ParsedMessage::Rfc5424(msg) => {
                let (facility, severity) = split_priority(msg.priority)?;
                if msg.app_name.is_empty() {
                    return Err(NormalizeError::MissingAppName);
                }
                let proc_id = match msg.proc_id.as_str() {
                    "" | "-" => 0,
                    other => other.parse().unwrap_or(0),
                };
                Ok(LogRecord {
                    timestamp: msg.timestamp.unwrap_or(received_at),
                    hostname: msg.hostname,
                    priority: msg.priority,
                    facility,
                    severity,
                    app_name: msg.app_name,
                    proc_id,
                    message: msg.message,
                    rfc: RfcVersion::Rfc5424,
                })
            }
        }
    }
}

/// Split a wire priority into facility and severity.
///
/// Inverse invariant: `facility * 8 + severity == priority`.
pub fn split_priority(priority: u8) -> Result<(Facility, Severity), NormalizeError> {
    if priority > 191 {
        return Err(NormalizeError::InvalidPriority(priority));
    }
    let facility =
        Facility::try_from(priority / 8).map_err(|_| NormalizeError::InvalidPriority(priority))?;
    let severity =
        Severity::try_from(priority % 8).map_err(|_| NormalizeError::InvalidPriority(priority))?;
    Ok((facility, severity))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn priority_invariant_holds_for_all_values() {
        for priority in 0..=191u8 {
            let (facility, severity) = split_priority(priority).unwrap();
            assert_eq!(facility.as_u8() * 8 + severity.as_u8(), priority);
        }
        assert!(split_priority(192).is_err());
    }

    #[test]
    fn rfc5424_keeps_wire_timestamp() {
        let wire = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let record = ParsedMessage::Rfc5424(Rfc5424Message {
            priority: 14,
            timestamp: Some(wire),
            hostname: "host1".into(),
            app_name: "myapp".into(),
            proc_id: "42".into(),
            msg_id: String::new(),
            message: "hello".into(),
        })
        .into_record(received())
        .unwrap();

        assert_eq!(record.timestamp, wire);
        assert_eq!(record.facility, Facility::User);
        assert_eq!(record.severity, Severity::Informational);
        assert_eq!(record.proc_id, 42);
        assert_eq!(record.rfc, RfcVersion::Rfc5424);
    }

    #[test]
    fn rfc3164_is_stamped_with_receipt_time() {
        let wire = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let record = ParsedMessage::Rfc3164(Rfc3164Message {
            priority: 34,
            timestamp: Some(wire),
            hostname: "host1".into(),
            tag: "su".into(),
            content: "'su root' failed".into(),
        })
        .into_record(received())
        .unwrap();

        assert_eq!(record.timestamp, received());
        assert_eq!(record.app_name, "su");
        assert_eq!(record.proc_id, 0);
        assert_eq!(record.rfc, RfcVersion::Rfc3164);
    }

    #[test]
    fn nil_proc_id_maps_to_zero() {
        let record = ParsedMessage::Rfc5424(Rfc5424Message {
            priority: 165,
            timestamp: None,
            hostname: "host1".into(),
            app_name: "app".into(),
            proc_id: "-".into(),
            msg_id: "ID47".into(),
            message: "m".into(),
        })
        .into_record(received())
        .unwrap();

        assert_eq!(record.proc_id, 0);
        assert_eq!(record.timestamp, received());
    }

    #[test]
    fn empty_app_name_is_rejected() {
        let err = ParsedMessage::Rfc5424(Rfc5424Message {
            priority: 14,
            timestamp: None,
            hostname: "host1".into(),
            app_name: String::new(),
            proc_id: String::new(),
            msg_id: String::new(),
            message: "m".into(),
        })
        .into_record(received())
        .unwrap_err();

        assert_eq!(err, NormalizeError::MissingAppName);
    }

    #[test]
    fn out_of_range_priority_is_rejected() {
        let err = ParsedMessage::Rfc3164(Rfc3164Message {
            priority: 200,
            timestamp: None,
            hostname: "h".into(),
            tag: "t".into(),
            content: "c".into(),
        })
        .into_record(received())
        .unwrap_err();

        assert_eq!(err, NormalizeError::InvalidPriority(200));
    }
}
