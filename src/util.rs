// Utility helpers for parsing and basic statistics.
//
// This module centralizes all the "dirty" CSV/date handling so the rest of
// the code can assume clean, typed values, plus the display helpers used by
// the console previews.
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

/// Date-only layouts, tried in order. Numeric day/month layouts are always
/// read month-first, whichever separator the export uses.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%b %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m-%d-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M",
];

/// Outcome of a tolerant field parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Missing,
    Parsed(NaiveDate),
    /// Non-empty but unreadable; treated as missing by callers.
    Invalid,
}

fn is_null_token(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "" | "nan" | "nat" | "null" | "none" | "na" | "n/a" | "-"
    )
}

/// Parse a date-like cell into a calendar day.
///
/// - Trims whitespace; empty cells and the usual null spellings
///   (`NaN`, `NaT`, `null`, ...) are `Missing`.
/// - Accepts RFC 3339 timestamps, several datetime layouts and several
///   date-only layouts. Time components are dropped.
/// - Anything else is `Invalid`.
pub fn parse_date_field(s: Option<&str>) -> DateField {
    let Some(s) = s.map(str::trim) else {
        return DateField::Missing;
    };
    if is_null_token(s) {
        return DateField::Missing;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return DateField::Parsed(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return DateField::Parsed(dt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return DateField::Parsed(d);
        }
    }
    DateField::Invalid
}

/// Trimmed categorical value, or `fallback` when the cell is blank.
pub fn label_or(s: Option<&str>, fallback: &str) -> String {
    match s.map(str::trim) {
        Some(v) if !is_null_token(v) => v.to_string(),
        _ => fallback.to_string(),
    }
}

pub fn days_diff(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// `part / whole * 100`, defined as 0 when `whole` is 0.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

pub fn average(v: &[f64]) -> f64 {
    // Standard arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals with locale-aware thousands separators (`1,234.50`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_val: i64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = parts.next() {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

pub fn display_pct(v: &f64) -> String {
    format!("{}%", format_number(*v, 2))
}

pub fn display_delta(v: &Option<f64>) -> String {
    match v {
        Some(d) => format!("{:+.2}%", d),
        None => "N/A".to_string(),
    }
}

pub fn display_opt_days(v: &Option<f64>) -> String {
    match v {
        Some(d) => format!("{:.2}", d),
        None => "N/A".to_string(),
    }
}
