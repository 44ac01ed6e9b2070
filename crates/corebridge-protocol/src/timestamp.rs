//! The fixed `YYYYMMDDThhmmss.mmm` UTC timestamp format used on the wire.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::ProtocolError;

/// `chrono` format string for wire timestamps, e.g. `20240315T093000.250`.
pub const WIRE_FORMAT: &str = "%Y%m%dT%H%M%S%.3f";

/// Renders a timestamp in the wire format, millisecond precision.
pub fn format(at: &DateTime<Utc>) -> String {
    at.format(WIRE_FORMAT).to_string()
}

/// Parses a wire timestamp. The fractional part may be omitted.
pub fn parse(text: &str) -> Result<DateTime<Utc>, ProtocolError> {
    NaiveDateTime::parse_from_str(text.trim(), "%Y%m%dT%H%M%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| ProtocolError::Decode(format!("bad timestamp `{text}`: {e}")))
}
