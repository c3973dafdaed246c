//! Date parsing utilities.
//!
//! Upstream payloads carry dates in a handful of inconsistent formats;
//! [`parse_date`] tries each recognized format in order and gives up
//! quietly, mirroring how the rest of the pipeline treats malformed
//! upstream data as absent rather than fatal.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Recognized input formats, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
];

/// Default human-readable output format ("March 15, 2024").
const DISPLAY_FORMAT: &str = "%B %d, %Y";

/// Parses a date string in any of the recognized formats.
///
/// Returns `None` for empty or unrecognized input.
pub fn parse_date(date_string: &str) -> Option<NaiveDate> {
    let trimmed = date_string.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Formats a date as a readable string ("March 15, 2024").
pub fn format_date(date: NaiveDate) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}

/// Extracts the first plausible 4-digit year (19xx or 20xx) from a string.
pub fn extract_year(date_string: &str) -> Option<i32> {
    static YEAR_RE: OnceLock<Regex> = OnceLock::new();
    let re = YEAR_RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid year regex"));
    re.find(date_string)
        .and_then(|m| m.as_str().parse().ok())
}
