//! Timestamp text shared by the storage backends.

use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::BackendError;

/// Naive ISO timestamps written by older tools, read as UTC.
const NAIVE_ISO: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");

/// SQLite `datetime('now')` / `strftime` style, read as UTC.
const NAIVE_SQL: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]");

/// # Errors
/// Returns [`BackendError::Write`] when the value cannot be rendered as RFC 3339.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, BackendError> {
    value
        .format(&Rfc3339)
        .map_err(|err| BackendError::Write(format!("failed to format timestamp: {err}")))
}

/// RFC 3339, or a naive ISO/SQL timestamp taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed);
    }
    [NAIVE_ISO, NAIVE_SQL]
        .into_iter()
        .find_map(|description| PrimitiveDateTime::parse(raw, description).ok())
        .map(PrimitiveDateTime::assume_utc)
}
