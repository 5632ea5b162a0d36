//! Clean sheet → record assembly.
//!
//! Stage 2 of the pipeline: rows of an already-normalized sheet become typed
//! records ready for upserting. Assembly is deliberately more forgiving than
//! normalization for branch files: a clean file written by an older run may
//! lack some metric columns, and those simply assemble as `None`. Only the
//! barcode key is non-negotiable. The transfer sheet is strict: all five
//! columns must be present or the run is broken.

use chrono::NaiveDate;
use tracing::debug;

use crate::error::{Result, SheetError};
use crate::fields::{coerce_date, coerce_int, normalize_barcode};
use crate::grid::Sheet;
use crate::schema::{columns, BranchCode, BranchRecord, TransferRecord};

/// Assemble branch metric records for `branch` out of a clean sheet.
///
/// The barcode column is required; every other column is optional and
/// missing ones yield `None` fields. Rows whose barcode normalizes to
/// nothing are skipped.
pub fn assemble_branch_records(sheet: &Sheet, branch: BranchCode) -> Result<Vec<BranchRecord>> {
    let barcode_idx = sheet
        .column_index(columns::BARCODE)
        .ok_or_else(|| SheetError::MissingColumns(vec![columns::BARCODE.to_string()]))?;

    let sales_prev_idx = sheet.column_index(columns::SALES_PREV_MONTH);
    let sales_current_idx = sheet.column_index(columns::SALES_CURRENT_MONTH);
    let sales_period_idx = sheet.column_index(columns::SALES_PERIOD);
    let sales_from_idx = sheet.column_index(columns::SALES_FROM_WAREHOUSES);
    let stock_idx = sheet.column_index(columns::STOCK_BALANCE);
    let movement_idx = sheet.column_index(columns::LAST_MOVEMENT_DATE);

    let mut records = Vec::with_capacity(sheet.rows.len());
    let mut skipped = 0usize;
    for row in 0..sheet.rows.len() {
        let Some(barcode) = normalize_barcode(sheet.cell(row, barcode_idx)) else {
            skipped += 1;
            continue;
        };
        records.push(BranchRecord {
            branch_code: branch,
            barcode,
            sales_prev_month: int_at(sheet, row, sales_prev_idx),
            sales_current_month: int_at(sheet, row, sales_current_idx),
            sales_period: int_at(sheet, row, sales_period_idx),
            sales_from_warehouses: int_at(sheet, row, sales_from_idx),
            stock_balance: int_at(sheet, row, stock_idx),
            last_movement_date: date_at(sheet, row, movement_idx),
        });
    }

    if skipped > 0 {
        debug!(branch = %branch, skipped, "skipped keyless rows during assembly");
    }
    Ok(records)
}

/// Assemble transfer stock records out of the clean transfer sheet.
///
/// All five canonical columns are required. Rows whose barcode normalizes
/// to nothing are skipped; duplicate barcodes are kept in order, so a later
/// row wins on upsert exactly as it does in the source file.
pub fn assemble_transfer_records(sheet: &Sheet) -> Result<Vec<TransferRecord>> {
    let name_idx = sheet.column_index(columns::NAME);
    let barcode_col = sheet.column_index(columns::BARCODE);
    let total_idx = sheet.column_index(columns::STOCK_TOTAL);
    let central_idx = sheet.column_index(columns::STOCK_CENTRAL);
    let purchase_idx = sheet.column_index(columns::LAST_PURCHASE_DATE);

    let mut missing: Vec<String> = [
        (columns::NAME, name_idx),
        (columns::BARCODE, barcode_col),
        (columns::STOCK_TOTAL, total_idx),
        (columns::STOCK_CENTRAL, central_idx),
        (columns::LAST_PURCHASE_DATE, purchase_idx),
    ]
    .iter()
    .filter(|(_, idx)| idx.is_none())
    .map(|(name, _)| name.to_string())
    .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(SheetError::MissingColumns(missing));
    }
    let Some(barcode_idx) = barcode_col else {
        return Err(SheetError::MissingColumns(vec![columns::BARCODE.to_string()]));
    };

    let mut records = Vec::with_capacity(sheet.rows.len());
    let mut skipped = 0usize;
    for row in 0..sheet.rows.len() {
        let Some(barcode) = normalize_barcode(sheet.cell(row, barcode_idx)) else {
            skipped += 1;
            continue;
        };
        records.push(TransferRecord {
            barcode,
            name: text_at(sheet, row, name_idx),
            stock_total: int_at(sheet, row, total_idx),
            stock_central: int_at(sheet, row, central_idx),
            last_purchase_date: date_at(sheet, row, purchase_idx),
        });
    }

    if skipped > 0 {
        debug!(skipped, "skipped keyless rows during assembly");
    }
    Ok(records)
}

fn int_at(sheet: &Sheet, row: usize, col: Option<usize>) -> Option<i64> {
    col.and_then(|idx| coerce_int(sheet.cell(row, idx)))
}

fn date_at(sheet: &Sheet, row: usize, col: Option<usize>) -> Option<NaiveDate> {
    col.and_then(|idx| coerce_date(sheet.cell(row, idx)))
}

fn text_at(sheet: &Sheet, row: usize, col: Option<usize>) -> Option<String> {
    let rendered = sheet.cell(row, col?).to_display_string();
    let trimmed = rendered.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
