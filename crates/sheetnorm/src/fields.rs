//! Field-level coercion.
//!
//! Cell values arrive in whatever shape Excel happened to store them:
//! barcodes as floats, counts as text, dates as serials or day-first
//! strings. The coercers here fold all of that into `Option` values;
//! missing and unparseable both map to `None`. Sentinel substitution
//! (`0` for counts, 1900-01-01 for dates) happens only at the persistence
//! boundary in the loader, never here.

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;

use crate::grid::Cell;

/// Placeholder stored for dates that are missing or unparseable. Chosen to
/// be obviously artificial and to sort before any real movement date.
pub static SENTINEL_DATE: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(1900, 1, 1).expect("sentinel date"));

/// Day-first datetime formats accepted in text cells, most common first.
const DATETIME_FORMATS: &[&str] = &[
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Day-first date formats accepted in text cells.
const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// Normalize a barcode cell into its canonical textual form.
///
/// Numeric cells are rendered without the float artifact Excel introduces
/// (`4820070000000.0` is the barcode `4820070000000`); text cells are
/// trimmed and lose a single trailing `.0` left behind by earlier exports.
/// Only the suffix is stripped: a real `.0` elsewhere in the value stays.
/// Empty and whitespace-only cells yield `None`, which downstream treats
/// as "row has no key".
pub fn normalize_barcode(cell: &Cell) -> Option<String> {
    let rendered = cell.to_display_string();
    let trimmed = rendered.trim();
    let canonical = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    if canonical.is_empty() {
        None
    } else {
        Some(canonical.to_string())
    }
}

/// Coerce a cell into an integer count.
///
/// Numbers are truncated toward zero (stock counts exported as `12.9` mean
/// 12 on the shelf); text is parsed as an integer first, then as a float
/// and truncated. Anything else is `None`.
pub fn coerce_int(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Number(n) if n.is_finite() => Some(*n as i64),
        Cell::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                return Some(i);
            }
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() => Some(f as i64),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Coerce a cell into a calendar date.
///
/// Native datetime cells keep their date part. Text cells are parsed
/// day-first (`15.03.2024`, with or without a time, plus the slash, dash
/// and ISO spellings). Bare numbers are not treated as Excel date serials:
/// a numeric cell in a date column is an upstream export bug, and mapping
/// it through the 1899 epoch would invent a date nobody entered.
pub fn coerce_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Text(s) => parse_date_text(s.trim()),
        _ => None,
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Some(d);
        }
    }
    None
}

// =============================================================================
// TESTS
// =============================================================================
