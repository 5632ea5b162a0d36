//! Error types shared by the normalization pipeline.

use thiserror::Error;

/// Errors produced while reading, normalizing or assembling spreadsheet data.
#[derive(Error, Debug)]
pub enum SheetError {
    #[error("no header row found (no row contains a barcode column)")]
    HeaderNotFound,

    #[error("no sales columns matched the period filter")]
    NoSalesColumns,

    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("workbook contains no worksheets: {0}")]
    EmptyWorkbook(String),

    #[error("unsupported input extension: {0} (expected .xlsx/.xls/.csv)")]
    UnsupportedExtension(String),

    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("failed to read csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write workbook: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SheetError>;
