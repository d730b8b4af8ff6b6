//! Filter parameters for stored-log reads.

use chrono::{DateTime, Utc};
use coriolis_record::Severity;

/// Parameters for a stored-log query. `app_name` selects the measurement
/// and is required; every other predicate is optional, absent meaning
/// unconstrained in that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub app_name: String,
    pub hostname: Option<String>,
    /// Inclusive lower time bound.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper time bound.
    pub end_date: Option<DateTime<Utc>>,
    /// Severity floor: only records at least this severe (numerically
    /// lower or equal) are returned. Only set when the client asked for it.
    pub severity: Option<Severity>,
}

impl QueryParams {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }
}
