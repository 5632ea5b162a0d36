//! Column-name cleaning.
//!
//! Raw export headers routinely carry embedded line breaks and stray runs of
//! spaces (the upstream system wraps long captions inside the cell). Every
//! header is passed through [`clean_column_name`] before any matching or
//! mapping happens, so the rest of the pipeline only ever sees the cleaned
//! form.

/// Normalize a raw header caption into its canonical single-line form.
///
/// Replaces `\n` and `\r` with spaces, trims leading/trailing whitespace and
/// collapses every run of consecutive spaces to a single space. The function
/// is idempotent: cleaning an already-clean name returns it unchanged.
pub fn clean_column_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    name = name.trim().to_string();
    // Collapse to a fixpoint so odd-length runs cannot survive one pass.
    while name.contains("  ") {
        name = name.replace("  ", " ");
    }
    name
}

// =============================================================================
// TESTS
// =============================================================================
