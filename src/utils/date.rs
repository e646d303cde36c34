//! Date parsing and formatting helpers built on `chrono`.
//!
//! Dates are kept as [`NaiveDateTime`] in site-local time: front matter
//! values are taken as written, file modification times are converted to
//! the local timezone.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;
use std::{sync::LazyLock, time::SystemTime};

/// `YYYY-MM-DD-slug` filename prefix used by posts.
static RE_FILENAME_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})-(.+)$").unwrap());

/// Accepted front-matter date layouts, tried in order after RFC 3339.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse a front-matter date.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]`, the `T`-separated
/// variants, RFC 3339 and `YYYY-MM-DD HH:MM:SS +ZZZZ`. Offsets are dropped
/// after parsing: the wall-clock time is kept as written.
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt.naive_local());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Split a `YYYY-MM-DD-slug` basename into its date and slug.
///
/// Returns `None` when the prefix is missing or not a real calendar date.
pub fn split_filename_date(basename: &str) -> Option<(NaiveDateTime, &str)> {
    let caps = RE_FILENAME_DATE.captures(basename)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    let slug = caps.get(4)?.as_str();
    Some((date, slug))
}

/// Strip a leading `YYYY-MM-DD-` prefix if present.
pub fn strip_date_prefix(basename: &str) -> &str {
    split_filename_date(basename).map_or(basename, |(_, slug)| slug)
}

/// Convert a filesystem timestamp to local wall-clock time.
pub fn from_system_time(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

/// Current local wall-clock time.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// RFC 2822 form for feeds, e.g. `Mon, 15 Jan 2024 00:00:00 +0000`.
pub fn to_rfc2822(dt: &NaiveDateTime) -> String {
    match Local.from_local_datetime(dt).earliest() {
        Some(local) => local.to_rfc2822(),
        None => dt.and_utc().to_rfc2822(),
    }
}

/// XML schema form, e.g. `2024-01-15T00:00:00+00:00`.
pub fn to_xmlschema(dt: &NaiveDateTime) -> String {
    match Local.from_local_datetime(dt).earliest() {
        Some(local) => local.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
        None => dt.and_utc().format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
    }
}
