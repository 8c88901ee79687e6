//! Conversions between `DurationSinceUnixEpoch` and human readable times.
use chrono::{DateTime, Utc};

use crate::DurationSinceUnixEpoch;

/// It converts a timestamp into a UTC date time.
///
/// It returns `None` when the timestamp does not fit into a `DateTime<Utc>`.
#[must_use]
pub fn convert_from_timestamp_to_datetime_utc(duration: DurationSinceUnixEpoch) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(duration.as_secs()).ok()?;
    DateTime::from_timestamp(secs, duration.subsec_nanos())
}

/// It formats a timestamp as an RFC 3339 string, falling back to the raw
/// number of seconds when it cannot be represented as a date.
#[must_use]
pub fn format_timestamp(duration: DurationSinceUnixEpoch) -> String {
    match convert_from_timestamp_to_datetime_utc(duration) {
        Some(datetime) => datetime.to_rfc3339(),
        None => format!("{}s", duration.as_secs()),
    }
}
