//! Declared caption-to-column mapping.
//!
//! Each pipeline declares the full set of source captions it needs and the
//! canonical column each one becomes, then resolves the whole declaration
//! against the sheet in one step. Resolution either finds every caption or
//! fails with the complete list of missing columns, so an operator sees the
//! whole problem at once instead of one missing column per run.

use crate::error::{Result, SheetError};
use crate::grid::Sheet;

/// An ordered caption → canonical-column declaration.
///
/// Insertion order is projection order. Re-inserting an existing caption
/// replaces its target but keeps its original position, so one source
/// column always feeds exactly one output column.
#[derive(Debug, Default)]
pub struct ColumnMap {
    entries: Vec<(String, &'static str)>,
}

impl ColumnMap {
    pub fn new() -> Self {
        ColumnMap::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, target: &'static str) {
        let source = source.into();
        match self.entries.iter_mut().find(|(s, _)| *s == source) {
            Some(entry) => entry.1 = target,
            None => self.entries.push((source, target)),
        }
    }

    /// Match every declared caption against the sheet's columns.
    ///
    /// Fails with [`SheetError::MissingColumns`] listing the canonical names
    /// of all unmatched captions, sorted for stable messages.
    pub fn resolve(&self, sheet: &Sheet) -> Result<ResolvedColumns> {
        let mut pairs = Vec::with_capacity(self.entries.len());
        let mut missing = Vec::new();

        for (source, target) in &self.entries {
            match sheet.column_index(source) {
                Some(idx) => pairs.push((idx, *target)),
                None => missing.push(target.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(ResolvedColumns { pairs })
        } else {
            missing.sort();
            Err(SheetError::MissingColumns(missing))
        }
    }
}

/// A fully matched mapping: source column index plus canonical name, in
/// declaration order.
#[derive(Debug)]
pub struct ResolvedColumns {
    pairs: Vec<(usize, &'static str)>,
}

impl ResolvedColumns {
    /// Build a new sheet containing only the mapped columns, renamed to
    /// their canonical names.
    pub fn project(&self, sheet: &Sheet) -> Sheet {
        let columns = self.pairs.iter().map(|(_, t)| t.to_string()).collect();
        let rows = (0..sheet.rows.len())
            .map(|row| {
                self.pairs
                    .iter()
                    .map(|(idx, _)| sheet.cell(row, *idx).clone())
                    .collect()
            })
            .collect();
        Sheet { columns, rows }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Cell, Grid};

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn sheet(columns: &[&str], rows: Vec<Vec<Cell>>) -> Sheet {
        let mut grid_rows = vec![columns.iter().map(|c| text(c)).collect::<Vec<_>>()];
        grid_rows.extend(rows);
        Sheet::from_grid(Grid::from_rows(grid_rows), 0)
    }

    #[test]
    fn test_resolve_and_project_in_declaration_order() {
        let s = sheet(
            &["Товар", "Штрих-код", "Сальдо (кон.)"],
            vec![vec![text("чай"), text("111"), Cell::Number(5.0)]],
        );

        let mut map = ColumnMap::new();
        map.insert("Штрих-код", "barcode");
        map.insert("Сальдо (кон.)", "stock_balance");

        let projected = map.resolve(&s).unwrap().project(&s);
        assert_eq!(projected.columns, vec!["barcode", "stock_balance"]);
        assert_eq!(projected.rows.len(), 1);
        assert_eq!(projected.cell(0, 0), &text("111"));
        assert_eq!(projected.cell(0, 1), &Cell::Number(5.0));
    }

    #[test]
    fn test_resolve_reports_all_missing_columns_sorted() {
        let s = sheet(&["Товар"], vec![]);

        let mut map = ColumnMap::new();
        map.insert("Штрих-код", "barcode");
        map.insert("Товар", "name");
        map.insert("Сальдо (кон.)", "stock_total");

        let err = map.resolve(&s).unwrap_err();
        match err {
            SheetError::MissingColumns(missing) => {
                assert_eq!(missing, vec!["barcode".to_string(), "stock_total".to_string()]);
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_reinserting_a_caption_replaces_target_in_place() {
        let s = sheet(
            &["Штрих-код", "Продажа (склад получатель) за период"],
            vec![vec![text("111"), Cell::Number(7.0)]],
        );

        let mut map = ColumnMap::new();
        map.insert("Штрих-код", "barcode");
        map.insert("Продажа (склад получатель) за период", "sales_period");
        // The same caption claimed again keeps position 1 with the new name.
        map.insert("Продажа (склад получатель) за период", "sales_current_month");

        let projected = map.resolve(&s).unwrap().project(&s);
        assert_eq!(projected.columns, vec!["barcode", "sales_current_month"]);
    }

    #[test]
    fn test_project_pads_short_rows() {
        let s = sheet(&["a", "b"], vec![vec![text("1")]]);

        let mut map = ColumnMap::new();
        map.insert("a", "left");
        map.insert("b", "right");

        let projected = map.resolve(&s).unwrap().project(&s);
        assert_eq!(projected.cell(0, 1), &Cell::Empty);
    }
}
