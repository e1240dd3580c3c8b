// ABOUTME: Utilities for working with times and timestamps.
// ABOUTME: Provides RFC3339 formatting and recording-filename stamps.
use chrono::{DateTime, Local, SecondsFormat, Utc};

/// Convert a UTC timestamp to an RFC3339 string
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// let time = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
/// assert_eq!(fc_core::to_rfc3339(time), "2021-01-01T00:00:00Z");
/// ```
pub fn to_rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Get current time as an RFC3339 formatted string
pub fn now_rfc3339() -> String {
    to_rfc3339(Utc::now())
}

/// Local-time stamp used in recording file names (`YYYYMMDD_HHMMSS`)
pub fn file_stamp(time: DateTime<Local>) -> String {
    time.format("%Y%m%d_%H%M%S").to_string()
}
