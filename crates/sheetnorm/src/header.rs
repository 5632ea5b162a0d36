//! Header row location.
//!
//! The upstream exports put report titles, filter descriptions and blank
//! lines above the real header, and the amount of preamble varies between
//! files and between months. The one stable anchor is the barcode column:
//! every export names it with a caption containing «Штрих». The first row
//! containing that marker (case-insensitive) is taken as the header.

use tracing::debug;

use crate::grid::Grid;

/// Marker substring identifying the barcode column, lowercase.
const HEADER_MARKER: &str = "штрих";

/// Find the index of the header row: the first row where any cell, rendered
/// as text and lowercased, contains [`HEADER_MARKER`]. Returns `None` when
/// no row qualifies.
pub fn locate_header(grid: &Grid) -> Option<usize> {
    let found = grid.rows.iter().position(|row| {
        row.iter()
            .any(|cell| cell.to_display_string().to_lowercase().contains(HEADER_MARKER))
    });
    if let Some(idx) = found {
        debug!(header_row = idx, "located header row");
    }
    found
}

// =============================================================================
// TESTS
// =============================================================================
