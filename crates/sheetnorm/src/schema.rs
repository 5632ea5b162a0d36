//! Domain vocabulary: branch codes, column names and assembled records.
//!
//! Two fixed vocabularies live here. `labels` holds the raw report captions
//! as they appear in the source workbooks (after cleaning); `columns` holds
//! the canonical snake_case names used in clean workbooks and in the store.
//! Keeping both in one place is what lets the normalizer declare its full
//! caption-to-column mapping up front instead of discovering it row by row.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

/// Source workbook captions, in cleaned form.
pub mod labels {
    pub const BARCODE: &str = "Штрих-код";
    pub const PRODUCT_NAME: &str = "Товар";
    pub const STOCK_BALANCE: &str = "Сальдо (кон.)";
    pub const SALES_PERIOD: &str = "Продажа (склад получатель) за период";
    pub const LAST_MOVEMENT_DATE: &str = "Дата последнего перемещения";
    pub const SALES_FROM_WAREHOUSES: &str = "Продажи склады отправки";
    pub const CENTRAL_STOCK: &str = "остаток в ЦО";
    pub const LAST_PURCHASE_DATE: &str = "дата последнего прихода";
}

/// Canonical column names used in clean workbooks and store tables.
pub mod columns {
    pub const BARCODE: &str = "barcode";
    pub const NAME: &str = "name";
    pub const SALES_PREV_MONTH: &str = "sales_prev_month";
    pub const SALES_CURRENT_MONTH: &str = "sales_current_month";
    pub const SALES_PERIOD: &str = "sales_period";
    pub const SALES_FROM_WAREHOUSES: &str = "sales_from_warehouses";
    pub const STOCK_BALANCE: &str = "stock_balance";
    pub const LAST_MOVEMENT_DATE: &str = "last_movement_date";
    pub const STOCK_TOTAL: &str = "stock_total";
    pub const STOCK_CENTRAL: &str = "stock_central";
    pub const LAST_PURCHASE_DATE: &str = "last_purchase_date";
}

/// Clean transfer workbook name, the handoff between normalizer and loader.
pub const TRANSFER_CLEAN_FILE: &str = "products_transfer_clean.xlsx";

/// The nine retail branches feeding the pipeline. The code doubles as the
/// input/output file stem (`lv_input.xlsx` → `lv_clean.xlsx`) and as the
/// `branch_code` key in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchCode {
    Lv,
    Rb,
    Lc,
    Hm,
    If,
    Zt,
    Mk,
    Dp,
    Ck,
}

impl BranchCode {
    pub const ALL: [BranchCode; 9] = [
        BranchCode::Lv,
        BranchCode::Rb,
        BranchCode::Lc,
        BranchCode::Hm,
        BranchCode::If,
        BranchCode::Zt,
        BranchCode::Mk,
        BranchCode::Dp,
        BranchCode::Ck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BranchCode::Lv => "lv",
            BranchCode::Rb => "rb",
            BranchCode::Lc => "lc",
            BranchCode::Hm => "hm",
            BranchCode::If => "if",
            BranchCode::Zt => "zt",
            BranchCode::Mk => "mk",
            BranchCode::Dp => "dp",
            BranchCode::Ck => "ck",
        }
    }

    /// Name of this branch's clean workbook, shared by normalizer and loader.
    pub fn clean_file_name(&self) -> String {
        format!("{}_clean.xlsx", self.as_str())
    }
}

impl fmt::Display for BranchCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BranchCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        BranchCode::ALL
            .into_iter()
            .find(|code| code.as_str() == lower)
            .ok_or_else(|| {
                format!(
                    "unknown branch code '{}' (expected one of: {})",
                    s,
                    BranchCode::ALL.map(|c| c.as_str()).join(", ")
                )
            })
    }
}

/// One normalized row of a branch inventory/sales export, keyed by
/// (`branch_code`, `barcode`). `None` metrics mean the source cell was
/// missing or unparseable; the loader substitutes sentinels on write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchRecord {
    pub branch_code: BranchCode,
    pub barcode: String,
    pub sales_prev_month: Option<i64>,
    pub sales_current_month: Option<i64>,
    pub sales_period: Option<i64>,
    pub sales_from_warehouses: Option<i64>,
    pub stock_balance: Option<i64>,
    pub last_movement_date: Option<NaiveDate>,
}

/// One normalized row of the central transfer stock export, keyed by
/// `barcode` alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferRecord {
    pub barcode: String,
    pub name: Option<String>,
    pub stock_total: Option<i64>,
    pub stock_central: Option<i64>,
    pub last_purchase_date: Option<NaiveDate>,
}

// =============================================================================
// TESTS
// =============================================================================
