//! Date helpers for building `dateTime.iso8601` parameters.
//!
//! Remote calls that schedule actions or filter by time take an XML-RPC
//! date. Users type those dates in a handful of human formats; this module
//! normalizes them and rejects anything else with `Error::InvalidDate`.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};
use crate::rpc::Value;

/// Wire format for `dateTime.iso8601` values.
pub const ISO8601_FORMAT: &str = "%Y%m%dT%H:%M:%S";

/// Accepted formats that carry a time component.
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    ISO8601_FORMAT,
    "%Y%m%d%H%M%S",
];

/// Accepted date-only formats, interpreted as midnight.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

/// Parse a user-supplied date or date-time string.
pub fn parse_date(input: &str) -> Result<NaiveDateTime> {
    let trimmed = input.trim();

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt);
            }
        }
    }

    Err(Error::InvalidDate(input.to_string()))
}

/// Parse a user-supplied date straight into an RPC parameter.
pub fn to_rpc(input: &str) -> Result<Value> {
    parse_date(input).map(Value::DateTime)
}

/// Render a date-time in the XML-RPC wire form.
pub fn format_iso8601(dt: &NaiveDateTime) -> String {
    dt.format(ISO8601_FORMAT).to_string()
}
