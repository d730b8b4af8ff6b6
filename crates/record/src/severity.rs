//! Syslog severities from RFC 5424.

use serde::{Deserialize, Serialize};

/// Syslog severity. Numerically lower is more severe.
///
/// Serializes as the bare integer, which is also how it is rendered into
/// datastore tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Informational = 6,
    Debug = 7,
}

/// Severity applied when a client does not specify one.
pub const DEFAULT_SEVERITY: Severity = Severity::Informational;

impl Severity {
    /// Severity applied when a client does not specify one.
    pub const fn default_level() -> Self {
        DEFAULT_SEVERITY
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Severity {
    type Error = InvalidSeverity;

    fn try_from(value: u8) -> Result<Self, InvalidSeverity> {
        let severity = match value {
            0 => Severity::Emergency,
            1 => Severity::Alert,
            2 => Severity::Critical,
            3 => Severity::Error,
            4 => Severity::Warning,
            5 => Severity::Notice,
            6 => Severity::Informational,
            7 => Severity::Debug,
            _ => return Err(InvalidSeverity(value)),
        };
        Ok(severity)
    }
}

impl From<Severity> for u8 {
    fn from(value: Severity) -> Self {
        value as u8
    }
}

impl std::fmt::Display for Severity {
    /// Renders the numeric value, matching the tag format of stored points.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// A priority or query carried a severity outside 0..=7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid severity {0}, expected 0..=7")]
pub struct InvalidSeverity(pub u8);
