//! Transcript renderers for the export-messages formats.

pub mod json;
pub mod text;
pub mod text_short;

use chrono::{Local, TimeZone};

/// Render a millisecond timestamp in local time, or "unknown".
pub(crate) fn format_time(msec: i64, format: &str) -> String {
    if msec < 0 {
        return "unknown".to_string();
    }
    Local
        .timestamp_millis_opt(msec)
        .single()
        .map(|t| t.format(format).to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub(crate) const LONG_TIME_FORMAT: &str = "%a, %-d %b %Y %H:%M:%S %z";
pub(crate) const SHORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
