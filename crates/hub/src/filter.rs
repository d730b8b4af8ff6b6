//! Per-subscriber record filters.

use coriolis_record::{LogRecord, Severity};
use serde::{Deserialize, Serialize};

/// What a subscriber wants to see. Mutable over the subscription lifetime:
/// each JSON object read from the peer replaces the whole spec.
///
/// An absent field means no constraint in that dimension, except that the
/// severity ceiling defaults to [`Severity::Informational`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Suppress records numerically above this severity (less severe).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Only records from this application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

impl FilterSpec {
    pub fn new(severity: Option<Severity>, app_name: Option<String>) -> Self {
        Self { severity, app_name }
    }

    /// Whether a record passes this filter.
    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(app_name) = self.app_name.as_deref()
            && !app_name.is_empty()
            && app_name != record.app_name
        {
            return false;
        }
        record.severity <= self.severity.unwrap_or(Severity::default_level())
    }
}
