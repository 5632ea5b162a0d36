//! Monthly sales column selection.
//!
//! Branch inventory exports carry one sales column per month with the period
//! embedded in the caption, e.g. «Продажа (склад получатель) за 03.2024».
//! Files accumulate months over time, so a fresh export may carry a dozen
//! such columns. Only the two most recent matter downstream: they become
//! `sales_prev_month` and `sales_current_month`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, SheetError};

/// Matches the MM.YYYY period token inside a column caption.
static MONTH_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{2}\.\d{4}").expect("month token regex"));

/// Marker that must appear in a sales column caption. Deliberately
/// case-sensitive: the upstream report generator always capitalizes the word,
/// and lowercase occurrences show up in unrelated footnote columns.
const SALES_MARKER: &str = "Продажа";

/// Qualifier substrings, matched case-insensitively.
const SALES_QUALIFIERS: &[&str] = &["склад", "получатель", "за"];

/// Year/month key ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

/// Extract the first MM.YYYY token from a caption and parse it.
///
/// Returns `None` when no token is present or the token is not a real month
/// (e.g. `13.2024`). Callers treat `None` as "older than everything": columns
/// without a parseable period sort before every dated column.
pub fn month_key_of(name: &str) -> Option<MonthKey> {
    let token = MONTH_TOKEN_RE.find(name)?.as_str();
    let (month_str, year_str) = token.split_once('.')?;
    let month: u32 = month_str.parse().ok()?;
    let year: i32 = year_str.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some(MonthKey { year, month })
}

/// Does this (cleaned) caption denote a monthly sales column?
pub fn is_sales_column(name: &str) -> bool {
    if !name.contains(SALES_MARKER) {
        return false;
    }
    let lower = name.to_lowercase();
    SALES_QUALIFIERS.iter().all(|q| lower.contains(q))
}

/// The selected sales columns, by cleaned caption.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesColumns {
    /// Second most recent period; absent when only one sales column exists.
    pub prev: Option<String>,
    /// Most recent period.
    pub current: String,
}

/// Pick the sales columns for the previous and current month out of `columns`.
///
/// Candidates are filtered by [`is_sales_column`], sorted chronologically by
/// their period token (undated candidates first, original order preserved for
/// ties) and the last two win. With a single candidate only `current` is
/// filled. No candidate at all is an error: a branch export without sales
/// columns is structurally broken.
pub fn select_sales_columns(columns: &[String]) -> Result<SalesColumns> {
    let mut candidates: Vec<&String> = columns
        .iter()
        .filter(|c| is_sales_column(c.as_str()))
        .collect();
    if candidates.is_empty() {
        return Err(SheetError::NoSalesColumns);
    }

    // Stable sort: undated columns keep their relative order at the front.
    candidates.sort_by_key(|c| month_key_of(c.as_str()));

    let current = candidates
        .pop()
        .map(|c| c.to_string())
        .ok_or(SheetError::NoSalesColumns)?;
    let prev = candidates.pop().map(|c| c.to_string());
    Ok(SalesColumns { prev, current })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    // -------------------------------------------------------------------------
    // MONTH TOKEN PARSING
    // -------------------------------------------------------------------------

    #[test]
    fn test_month_key_extracted_from_caption() {
        assert_eq!(
            month_key_of("Продажа (склад получатель) за 03.2024"),
            Some(MonthKey { year: 2024, month: 3 })
        );
    }

    #[test]
    fn test_month_key_missing_token() {
        assert_eq!(month_key_of("Продажа (склад получатель) за период"), None);
    }

    #[test]
    fn test_month_key_rejects_impossible_month() {
        assert_eq!(month_key_of("за 13.2024"), None);
        assert_eq!(month_key_of("за 00.2024"), None);
    }

    #[test]
    fn test_month_key_ordering_is_chronological() {
        let dec_2023 = MonthKey { year: 2023, month: 12 };
        let jan_2024 = MonthKey { year: 2024, month: 1 };
        let mar_2024 = MonthKey { year: 2024, month: 3 };
        assert!(dec_2023 < jan_2024);
        assert!(jan_2024 < mar_2024);
    }

    #[test]
    fn test_month_key_takes_first_token() {
        assert_eq!(
            month_key_of("за 02.2024 против 03.2024"),
            Some(MonthKey { year: 2024, month: 2 })
        );
    }

    // -------------------------------------------------------------------------
    // CANDIDATE FILTER
    // -------------------------------------------------------------------------

    #[test]
    fn test_filter_requires_all_qualifiers() {
        assert!(is_sales_column("Продажа (склад получатель) за 03.2024"));
        assert!(!is_sales_column("Продажа за 03.2024"));
        assert!(!is_sales_column("Сальдо (кон.)"));
    }

    #[test]
    fn test_filter_marker_is_case_sensitive() {
        // Lowercase «продажа» appears in footnote columns and must not match.
        assert!(!is_sales_column("продажа (склад получатель) за 03.2024"));
    }

    #[test]
    fn test_filter_qualifiers_are_case_insensitive() {
        assert!(is_sales_column("Продажа (СКЛАД ПОЛУЧАТЕЛЬ) ЗА 03.2024"));
    }

    // -------------------------------------------------------------------------
    // SELECTION
    // -------------------------------------------------------------------------

    #[test]
    fn test_two_most_recent_columns_selected() {
        let columns = cols(&[
            "Штрих-код",
            "Продажа (склад получатель) за 01.2024",
            "Продажа (склад получатель) за 03.2024",
            "Продажа (склад получатель) за 02.2024",
            "Сальдо (кон.)",
        ]);
        let selected = select_sales_columns(&columns).unwrap();
        assert_eq!(
            selected.prev.as_deref(),
            Some("Продажа (склад получатель) за 02.2024")
        );
        assert_eq!(selected.current, "Продажа (склад получатель) за 03.2024");
    }

    #[test]
    fn test_year_boundary_ordering() {
        let columns = cols(&[
            "Продажа (склад получатель) за 12.2023",
            "Продажа (склад получатель) за 01.2024",
        ]);
        let selected = select_sales_columns(&columns).unwrap();
        assert_eq!(
            selected.prev.as_deref(),
            Some("Продажа (склад получатель) за 12.2023")
        );
        assert_eq!(selected.current, "Продажа (склад получатель) за 01.2024");
    }

    #[test]
    fn test_single_candidate_becomes_current_only() {
        let columns = cols(&["Продажа (склад получатель) за 03.2024"]);
        let selected = select_sales_columns(&columns).unwrap();
        assert_eq!(selected.prev, None);
        assert_eq!(selected.current, "Продажа (склад получатель) за 03.2024");
    }

    #[test]
    fn test_no_candidates_is_an_error() {
        let columns = cols(&["Штрих-код", "Сальдо (кон.)"]);
        assert!(matches!(
            select_sales_columns(&columns),
            Err(SheetError::NoSalesColumns)
        ));
    }

    #[test]
    fn test_undated_candidate_sorts_before_dated_ones() {
        // The period-total column qualifies but has no MM.YYYY token, so two
        // dated columns push it out of the selection.
        let columns = cols(&[
            "Продажа (склад получатель) за период",
            "Продажа (склад получатель) за 02.2024",
            "Продажа (склад получатель) за 03.2024",
        ]);
        let selected = select_sales_columns(&columns).unwrap();
        assert_eq!(
            selected.prev.as_deref(),
            Some("Продажа (склад получатель) за 02.2024")
        );
        assert_eq!(selected.current, "Продажа (склад получатель) за 03.2024");
    }

    #[test]
    fn test_undated_candidate_fills_prev_with_one_dated_column() {
        let columns = cols(&[
            "Продажа (склад получатель) за период",
            "Продажа (склад получатель) за 03.2024",
        ]);
        let selected = select_sales_columns(&columns).unwrap();
        assert_eq!(
            selected.prev.as_deref(),
            Some("Продажа (склад получатель) за период")
        );
        assert_eq!(selected.current, "Продажа (склад получатель) за 03.2024");
    }
}
