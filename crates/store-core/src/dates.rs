use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::debug;

// ── DateParser ────────────────────────────────────────────────────────────────

/// Coerces the assortment of date spellings found in raw exports into
/// calendar dates.
pub struct DateParser;

impl DateParser {
    /// Date-only patterns, tried in order. Month-first wins over day-first for
    /// slash-separated values because that is how the exports are written.
    const DATE_FORMATS: &'static [&'static str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d.%m.%Y"];

    const DATETIME_FORMATS: &'static [&'static str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];

    /// Parse `s` into a [`NaiveDate`], discarding any time-of-day component.
    ///
    /// Returns `None` for empty strings and unrecognised formats.
    pub fn parse(s: &str) -> Option<NaiveDate> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        for fmt in Self::DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                return Some(date);
            }
        }

        for fmt in Self::DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(dt.date());
            }
        }

        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
            return Some(dt.date_naive());
        }

        debug!("DateParser: could not parse date string \"{}\"", s);
        None
    }
}

// ── Tenure helpers ────────────────────────────────────────────────────────────

/// Whole days from `joined` to `basis`. Negative when `basis` precedes `joined`.
pub fn days_between(joined: NaiveDate, basis: NaiveDate) -> i64 {
    (basis - joined).num_days()
}

/// Calendar year of `date`.
pub fn year_of(date: NaiveDate) -> i32 {
    date.year()
}

/// Render a day count as `"<y> year(s) and <m> month(s)"` using 365-day
/// years and 30-day months.
///
/// Negative counts keep their sign on the year component.
pub fn describe_tenure(days: i64) -> String {
    let negative = days < 0;
    let abs = days.unsigned_abs();
    let years = abs / 365;
    let months = (abs % 365) / 30;
    if negative {
        format!("-{} year(s) and {} month(s)", years, months)
    } else {
        format!("{} year(s) and {} month(s)", years, months)
    }
}
