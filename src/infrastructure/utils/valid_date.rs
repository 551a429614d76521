use chrono::NaiveDate;
use tracing::debug;

use crate::entities::daily_picture::parse_calendar_date;

/// Parses a `YYYY-MM-DD` path or query value for the public read routes.
///
/// Malformed dates and dates before the first APOD yield `None`; callers
/// answer those with an empty envelope instead of an error status.
pub fn requested_date(field: &str, raw: &str) -> Option<NaiveDate> {
    match parse_calendar_date(raw) {
        Ok(date) => Some(date),
        Err(e) => {
            debug!(field, raw, "Ignoring unusable date: {}", e);
            None
        }
    }
}
