//! Spreadsheet normalization for the branch stock & sales pipeline.
//!
//! Nine retail branches plus a central warehouse export inventory and sales
//! workbooks with unstable layouts: variable preamble above the header,
//! captions wrapped across lines, barcodes stored as floats, month-stamped
//! sales columns accumulating over time. This crate turns those exports into
//! predictable data in two stages:
//!
//! 1. normalize: raw grid → clean sheet (canonical columns, selected sales
//!    months, clearance rows removed, barcodes as text) — see [`normalize`];
//! 2. assemble: clean sheet → typed records keyed by barcode — see
//!    [`assemble`].
//!
//! The `normalizer` and `loader` binaries are thin drivers around these two
//! stages; everything they share lives here.

pub mod assemble;
pub mod clean;
pub mod error;
pub mod fields;
pub mod grid;
pub mod header;
pub mod mapping;
pub mod normalize;
pub mod sales;
pub mod schema;

pub use assemble::{assemble_branch_records, assemble_transfer_records};
pub use error::{Result, SheetError};
pub use grid::{read_grid, write_sheet, Cell, Grid, Sheet};
pub use normalize::{normalize_branch_sheet, normalize_transfer_sheet};
pub use schema::{BranchCode, BranchRecord, TransferRecord};
