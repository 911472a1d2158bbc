use chrono::{DateTime, Duration, Utc};

use crate::error::AuditError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, PartialEq)]
pub struct TimeRange {
    pub start: chrono::DateTime<Utc>,
    pub end: chrono::DateTime<Utc>,
}

impl TimeRange {
    /// The `days` days ending at `end`.
    pub fn lookback(end: DateTime<Utc>, days: u32) -> Result<Self, AuditError> {
        let start = end
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| AuditError::Config(format!("lookback of {days} days is out of range")))?;
        Ok(TimeRange { start, end })
    }

    pub fn start_timestamp(&self) -> String {
        self.start.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn end_timestamp(&self) -> String {
        self.end.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Length of the range in whole seconds, at least one.
    pub fn seconds(&self) -> i64 {
        (self.end - self.start).num_seconds().max(1)
    }
}
