//! Timestamp codec
//!
//! Converts between the three representations a passage time takes on its
//! way through the system:
//! - free-form date-time text from the CSV log
//! - the canonical in-memory [`NaiveDateTime`] (second precision, no zone)
//! - the flat 14-digit match key (`YYYYMMDDHHMMSS`) compared against image
//!   filenames

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use std::path::Path;
use thiserror::Error;

/// Canonical text form used for persistence and display.
///
/// Lexical order of this form equals chronological order.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Match key layout (14 digits, zero padded, no separators)
pub const MATCH_KEY_FORMAT: &str = "%Y%m%d%H%M%S";

/// Accepted textual layouts, tried in order.
///
/// `%.f` consumes an optional fractional part, so each layout also accepts
/// sub-second precision.
const TEXT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
    "%d-%m-%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M",
];

/// Timestamp text could not be understood
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized timestamp: {value:?}")]
pub struct TimestampError {
    /// Offending input, as received
    pub value: String,
}

/// Parse date-time text into the canonical time value
///
/// Leading and trailing whitespace is ignored. Offsets in RFC 3339 input are
/// dropped (wall-clock time is kept) and fractional seconds are truncated.
pub fn parse(text: &str) -> Result<NaiveDateTime, TimestampError> {
    let trimmed = text.trim();
    let fail = || TimestampError {
        value: text.to_string(),
    };

    if trimmed.is_empty() {
        return Err(fail());
    }

    if let Some(time) = parse_match_key(trimmed) {
        return Ok(time);
    }

    for format in TEXT_FORMATS {
        if let Ok(time) = NaiveDateTime::parse_from_str(trimmed, format) {
            return truncate_subsecond(time).ok_or_else(fail);
        }
    }

    if let Ok(time) = DateTime::parse_from_rfc3339(trimmed) {
        return truncate_subsecond(time.naive_local()).ok_or_else(fail);
    }

    Err(fail())
}

/// Parse the canonical persisted form (`YYYY-MM-DD HH:MM:SS`)
pub fn parse_canonical(text: &str) -> Result<NaiveDateTime, TimestampError> {
    NaiveDateTime::parse_from_str(text, CANONICAL_FORMAT).map_err(|_| TimestampError {
        value: text.to_string(),
    })
}

/// Render the canonical persisted form
pub fn format(time: &NaiveDateTime) -> String {
    time.format(CANONICAL_FORMAT).to_string()
}

/// Render the 14-digit match key for a time value
///
/// No zone adjustment happens here; whatever [`parse`] resolved is used as-is.
pub fn to_match_key(time: &NaiveDateTime) -> String {
    time.format(MATCH_KEY_FORMAT).to_string()
}

/// Derive the match key candidate from an image filename
///
/// Strips the extension, then keeps only ASCII digits. The result is not
/// checked for the 14-digit shape; exact comparison against a CSV-derived
/// key is what validates it.
///
/// ```
/// use lombada_common::timestamp::match_key_from_filename;
///
/// assert_eq!(match_key_from_filename("2024-03-15 14 30 22.jpg"), "20240315143022");
/// assert_eq!(match_key_from_filename("cam1_20240315143022.jpeg"), "120240315143022");
/// ```
pub fn match_key_from_filename(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);

    stem.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Interpret a bare 14-digit key as a time value
fn parse_match_key(text: &str) -> Option<NaiveDateTime> {
    if text.len() != 14 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let field = |range: std::ops::Range<usize>| text[range].parse::<u32>().ok();

    let year = text[0..4].parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?.and_hms_opt(
        field(8..10)?,
        field(10..12)?,
        field(12..14)?,
    )
}

fn truncate_subsecond(time: NaiveDateTime) -> Option<NaiveDateTime> {
    time.with_nanosecond(0)
}

/// Serde adapter persisting [`NaiveDateTime`] in the canonical text form
pub mod serde_canonical {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format(time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::parse(&text).map_err(serde::de::Error::custom)
    }
}
