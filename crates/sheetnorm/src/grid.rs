//! Untyped spreadsheet grid I/O.
//!
//! Everything that touches a file on disk lives here. Readers produce a
//! [`Grid`] of raw [`Cell`]s with no header interpretation; the rest of the
//! pipeline works on [`Sheet`]s (a grid framed by a cleaned header row) and
//! never sees calamine or csv types directly.

use std::fs;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDateTime, NaiveTime};
use encoding_rs::WINDOWS_1251;
use tracing::debug;

use crate::clean::clean_column_name;
use crate::error::{Result, SheetError};

/// A single cell value, decoupled from any reader backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
}

static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Render the cell the way it would appear as text in the workbook.
    pub fn to_display_string(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::DateTime(dt) => format_datetime(dt),
        }
    }
}

/// Render a float without a spurious fraction when it holds a whole value.
/// Excel stores every numeric cell as f64, so integer barcodes and counts
/// arrive as `4820000000000.0` and must not pick up a `.0` when stringified.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Render a datetime in the day-first form used across the source files.
/// A zero time is dropped so pure dates round-trip as pure dates.
pub(crate) fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.time() == NaiveTime::MIN {
        dt.format("%d.%m.%Y").to_string()
    } else {
        dt.format("%d.%m.%Y %H:%M:%S").to_string()
    }
}

/// A rectangular block of raw cells, exactly as read from a file.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    pub rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        Grid { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A grid framed by a header row: cleaned column names plus the data rows
/// below the header. Rows may be ragged (csv input); [`Sheet::cell`] pads
/// with empty cells so callers can index freely.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    /// Frame `grid` at `header_idx`: the cells of that row become the column
    /// names (passed through [`clean_column_name`]) and everything below it
    /// becomes the data rows. Rows at and above the header are discarded.
    pub fn from_grid(mut grid: Grid, header_idx: usize) -> Sheet {
        let rows = if header_idx + 1 < grid.rows.len() {
            grid.rows.split_off(header_idx + 1)
        } else {
            Vec::new()
        };
        let columns = grid
            .rows
            .get(header_idx)
            .map(|header| {
                header
                    .iter()
                    .map(|cell| clean_column_name(&cell.to_display_string()))
                    .collect()
            })
            .unwrap_or_default();
        Sheet { columns, rows }
    }

    /// Index of the column with exactly this (cleaned) name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at (`row`, `col`), padding ragged rows with [`Cell::Empty`].
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// =============================================================================
// READERS
// =============================================================================

/// Read a raw grid from `path`, dispatching on the file extension.
///
/// `.xlsx` and `.xls` go through calamine (first worksheet only, matching the
/// upstream exports which carry a single sheet); `.csv` is decoded as UTF-8
/// with a windows-1251 fallback for legacy exports.
pub fn read_grid(path: &Path) -> Result<Grid> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "xlsx" | "xls" => read_workbook_grid(path),
        "csv" => read_csv_grid(path),
        _ => Err(SheetError::UnsupportedExtension(path.display().to_string())),
    }
}

fn read_workbook_grid(path: &Path) -> Result<Grid> {
    let mut workbook = open_workbook_auto(path)?;

    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = sheet_names
        .first()
        .ok_or_else(|| SheetError::EmptyWorkbook(path.display().to_string()))?;

    let range = workbook.worksheet_range(sheet_name)?;
    let rows: Vec<Vec<Cell>> = range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();

    debug!(
        path = %path.display(),
        sheet = %sheet_name,
        rows = rows.len(),
        "read worksheet"
    );
    Ok(Grid { rows })
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => {
            if s.is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Cell::DateTime(naive),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => {
            match NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                Ok(naive) => Cell::DateTime(naive),
                Err(_) => Cell::Text(s.clone()),
            }
        }
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(format!("#{:?}", e)),
    }
}

/// Read a csv file into a grid. The bytes are tried as UTF-8 first; exports
/// from the legacy terminal come in windows-1251, so undecodable input falls
/// back to that codepage instead of erroring out.
fn read_csv_grid(path: &Path) -> Result<Grid> {
    let bytes = fs::read(path)?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            let (decoded, _, _) = WINDOWS_1251.decode(err.as_bytes());
            debug!(path = %path.display(), "csv decoded as windows-1251");
            decoded.into_owned()
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(Grid { rows })
}

// =============================================================================
// WRITER
// =============================================================================

/// Write a sheet to an `.xlsx` file with the header in row 0.
///
/// Text cells are written as strings (this is what keeps barcodes intact:
/// by the time a normalized sheet reaches this function its barcode cells
/// are all [`Cell::Text`], so Excel never coerces them back to floats),
/// numbers as numbers, and datetimes in the renderable day-first form that
/// [`crate::fields::coerce_date`] accepts on the way back in.
pub fn write_sheet(sheet: &Sheet, path: &Path) -> Result<()> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, name) in sheet.columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, name)?;
    }

    for (row_idx, row) in sheet.rows.iter().enumerate() {
        let out_row = (row_idx + 1) as u32;
        for col in 0..sheet.columns.len() {
            let cell = row.get(col).unwrap_or(&EMPTY_CELL);
            match cell {
                Cell::Empty => {}
                Cell::Text(s) => {
                    worksheet.write_string(out_row, col as u16, s)?;
                }
                Cell::Number(n) => {
                    worksheet.write_number(out_row, col as u16, *n)?;
                }
                Cell::DateTime(dt) => {
                    worksheet.write_string(out_row, col as u16, &format_datetime(dt))?;
                }
            }
        }
    }

    workbook.save(path)?;
    debug!(path = %path.display(), rows = sheet.rows.len(), "wrote clean sheet");
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
