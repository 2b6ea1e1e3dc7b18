//! Conversions between hand-entered logbook text and canonical units.
//!
//! Durations are integer minutes and landings are integer counts. Parsing is lossy and never
//! fails: anything that cannot be read counts as zero.

use chrono::{NaiveDate, NaiveDateTime};
use logbook_contract::FieldKind;

use crate::record::CellValue;

/// How non-zero TIME cells of a record row are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeCellStyle {
    /// Print the entered text (`1.5` stays `1.5`).
    #[default]
    AsEntered,
    /// Print the parsed duration as `HH:MM` (`1.5` becomes `01:30`).
    Normalized,
}

// Two-digit years are tried first: `%Y` would read `24` as the year 24.
const DATE_FORMATS: [&str; 5] = ["%d/%m/%y", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

pub(crate) fn is_blank_text(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed.eq_ignore_ascii_case("nat")
}

fn parse_clock_part(part: &str) -> Option<i64> {
    let part = part.trim();
    if part.is_empty() {
        return Some(0);
    }
    part.parse::<i64>().ok()
}

pub(crate) fn hours_to_minutes(hours: f64) -> i64 {
    if !hours.is_finite() {
        return 0;
    }
    let minutes = (hours * 60.0).round_ties_even();
    if minutes <= 0.0 {
        0
    } else {
        minutes.min(i64::MAX as f64) as i64
    }
}

pub(crate) fn round_count(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    value
        .round_ties_even()
        .clamp(i64::MIN as f64, i64::MAX as f64) as i64
}

fn parse_decimal(text: &str) -> Option<f64> {
    text.trim().replace(',', ".").parse::<f64>().ok()
}

/// Parses `H:MM`, `H:MM:SS` (seconds >= 30 round the minute up) or decimal hours into minutes.
pub fn parse_time(text: &str) -> i64 {
    if is_blank_text(text) {
        return 0;
    }
    let text = text.trim();
    if text.contains(':') {
        let parts: Vec<&str> = text.split(':').collect();
        let h = parts.first().and_then(|p| parse_clock_part(p));
        let m = parts.get(1).and_then(|p| parse_clock_part(p));
        let (Some(h), Some(m)) = (h, m) else {
            return 0;
        };
        let mut minutes = h.saturating_mul(60).saturating_add(m);
        if parts.len() >= 3 {
            let Some(s) = parse_clock_part(parts[2]) else {
                return 0;
            };
            if s >= 30 {
                minutes = minutes.saturating_add(1);
            }
        }
        return minutes.max(0);
    }
    parse_decimal(text).map(hours_to_minutes).unwrap_or(0)
}

/// Parses integers, rounded decimals and yes/no style flags.
pub fn parse_count(text: &str) -> i64 {
    if is_blank_text(text) {
        return 0;
    }
    let lowered = text.trim().to_lowercase();
    match lowered.as_str() {
        "true" | "yes" | "sí" | "si" => return 1,
        "false" | "no" => return 0,
        _ => {}
    }
    if let Ok(v) = lowered.parse::<i64>() {
        return v;
    }
    parse_decimal(&lowered).map(round_count).unwrap_or(0)
}

/// Formats minutes as zero-padded `HH:MM`; hours are not capped at 24.
pub fn format_minutes(minutes: i64) -> String {
    let minutes = minutes.max(0);
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn is_date_field(field: &str) -> bool {
    logbook_contract::field_kind(field) == FieldKind::Date
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
    }
    None
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Display text of a raw cell, without any zero suppression.
pub fn format_display(field: &str, value: &CellValue) -> String {
    if value.is_blank() {
        return String::new();
    }
    match value {
        CellValue::Missing => String::new(),
        CellValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        CellValue::Number(v) => format_number(*v),
        CellValue::Text(text) => {
            if is_date_field(field) {
                if let Some(date) = parse_date(text) {
                    return date.format("%d/%m/%Y").to_string();
                }
            }
            text.trim().to_string()
        }
    }
}

/// Text drawn for one record cell. Aggregate cells that amount to zero are left blank.
pub fn format_cell(field: &str, value: &CellValue, style: TimeCellStyle) -> String {
    let kind = logbook_contract::field_kind(field);
    if kind.is_aggregate() {
        let amount = value.aggregate(kind);
        if amount == 0 {
            return String::new();
        }
        if kind == FieldKind::Time && style == TimeCellStyle::Normalized {
            return format_minutes(amount);
        }
    }
    format_display(field, value)
}

/// Text of a totals cell, `None` for fields that carry no totals.
pub fn format_total(kind: FieldKind, amount: i64) -> Option<String> {
    match kind {
        FieldKind::Time => Some(format_minutes(amount)),
        FieldKind::Count => Some(amount.to_string()),
        FieldKind::Date | FieldKind::Text => None,
    }
}
