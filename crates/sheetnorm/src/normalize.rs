//! Raw grid → clean sheet normalization.
//!
//! This is the whole of stage 1. A raw export grid goes in; a clean sheet
//! comes out with canonical column names, the two most recent sales columns
//! selected (branch files), clearance rows removed (transfer file), keyless
//! rows dropped and every barcode rewritten as a text cell. The clean sheet
//! is what gets written to `*_clean.xlsx` and what the loader later reads.

use tracing::debug;

use crate::error::{Result, SheetError};
use crate::fields::normalize_barcode;
use crate::grid::{Cell, Grid, Sheet};
use crate::header::locate_header;
use crate::mapping::ColumnMap;
use crate::sales::select_sales_columns;
use crate::schema::{columns, labels};

/// Marker identifying clearance ("уцінка") rows in the transfer export,
/// matched case-insensitively against the product name.
const CLEARANCE_MARKER: &str = "уцінка";

/// Normalize one branch inventory/sales export.
///
/// Locates the header, selects the previous/current month sales columns,
/// projects the declared columns under canonical names and finalizes the
/// barcode key. All declared columns are required here; a branch file with
/// a missing column is structurally broken and the caller decides whether
/// that skips the file or aborts the run.
pub fn normalize_branch_sheet(grid: Grid) -> Result<Sheet> {
    let header_idx = locate_header(&grid).ok_or(SheetError::HeaderNotFound)?;
    let sheet = Sheet::from_grid(grid, header_idx);

    let sales = select_sales_columns(&sheet.columns)?;

    let mut map = ColumnMap::new();
    map.insert(labels::BARCODE, columns::BARCODE);
    map.insert(labels::SALES_PERIOD, columns::SALES_PERIOD);
    map.insert(labels::STOCK_BALANCE, columns::STOCK_BALANCE);
    map.insert(labels::LAST_MOVEMENT_DATE, columns::LAST_MOVEMENT_DATE);
    map.insert(labels::SALES_FROM_WAREHOUSES, columns::SALES_FROM_WAREHOUSES);
    if let Some(prev) = &sales.prev {
        map.insert(prev.clone(), columns::SALES_PREV_MONTH);
    }
    map.insert(sales.current.clone(), columns::SALES_CURRENT_MONTH);

    let mut clean = map.resolve(&sheet)?.project(&sheet);
    let dropped = drop_keyless_rows(&mut clean)?;
    debug!(rows = clean.rows.len(), dropped_keyless = dropped, "normalized branch sheet");
    Ok(clean)
}

/// Normalize the central transfer stock export.
///
/// Same shape as the branch path minus the monthly sales selection, plus
/// the clearance-row filter: rows whose product name contains the
/// clearance marker are write-offs, not transferable stock.
pub fn normalize_transfer_sheet(grid: Grid) -> Result<Sheet> {
    let header_idx = locate_header(&grid).ok_or(SheetError::HeaderNotFound)?;
    let sheet = Sheet::from_grid(grid, header_idx);

    let mut map = ColumnMap::new();
    map.insert(labels::PRODUCT_NAME, columns::NAME);
    map.insert(labels::BARCODE, columns::BARCODE);
    map.insert(labels::STOCK_BALANCE, columns::STOCK_TOTAL);
    map.insert(labels::CENTRAL_STOCK, columns::STOCK_CENTRAL);
    map.insert(labels::LAST_PURCHASE_DATE, columns::LAST_PURCHASE_DATE);

    let mut clean = map.resolve(&sheet)?.project(&sheet);

    let name_idx = clean
        .column_index(columns::NAME)
        .ok_or_else(|| SheetError::MissingColumns(vec![columns::NAME.to_string()]))?;
    let cleared = drop_clearance_rows(&mut clean, name_idx);
    let dropped = drop_keyless_rows(&mut clean)?;
    debug!(
        rows = clean.rows.len(),
        dropped_clearance = cleared,
        dropped_keyless = dropped,
        "normalized transfer sheet"
    );
    Ok(clean)
}

/// Drop rows without a usable barcode and rewrite surviving keys as text
/// cells, so the written workbook can never coerce them back into floats.
fn drop_keyless_rows(sheet: &mut Sheet) -> Result<usize> {
    let barcode_idx = sheet
        .column_index(columns::BARCODE)
        .ok_or_else(|| SheetError::MissingColumns(vec![columns::BARCODE.to_string()]))?;

    let before = sheet.rows.len();
    sheet.rows.retain_mut(|row| {
        let cell = row.get(barcode_idx).cloned().unwrap_or(Cell::Empty);
        match normalize_barcode(&cell) {
            Some(code) => {
                if row.len() <= barcode_idx {
                    row.resize(barcode_idx + 1, Cell::Empty);
                }
                row[barcode_idx] = Cell::Text(code);
                true
            }
            None => false,
        }
    });
    Ok(before - sheet.rows.len())
}

fn drop_clearance_rows(sheet: &mut Sheet, name_idx: usize) -> usize {
    let before = sheet.rows.len();
    sheet.rows.retain(|row| {
        let is_clearance = row
            .get(name_idx)
            .map(|cell| {
                cell.to_display_string()
                    .to_lowercase()
                    .contains(CLEARANCE_MARKER)
            })
            .unwrap_or(false);
        !is_clearance
    });
    before - sheet.rows.len()
}

// =============================================================================
// TESTS
// =============================================================================
