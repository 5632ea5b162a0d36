//! Normalizer Service - Turns raw branch and transfer exports into clean workbooks
//!
//! Responsibilities:
//! - Resolve raw input files per branch (`<code>_input.xlsx/.xls/.csv`)
//! - Locate headers, select sales columns, canonicalize column names
//! - Write `<code>_clean.xlsx` / `products_transfer_clean.xlsx` for the loader
//! - Isolate branch file failures: one broken export never blocks the rest
//!
//! The transfer file is different: there is exactly one and the loader
//! cannot run without it, so any transfer failure aborts the run.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use sheetnorm::grid::{read_grid, write_sheet};
use sheetnorm::schema::TRANSFER_CLEAN_FILE;
use sheetnorm::{normalize_branch_sheet, normalize_transfer_sheet, BranchCode};

/// Extensions probed for raw inputs, in preference order.
const INPUT_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv"];

const TRANSFER_INPUT_STEM: &str = "products_transfer_raw";

#[derive(Parser, Debug)]
#[command(
    name = "normalizer",
    about = "Normalizes raw branch and transfer workbooks into clean workbooks"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory containing raw input workbooks
    #[arg(long, default_value = "data/input")]
    input_dir: PathBuf,

    /// Directory for clean output workbooks
    #[arg(long, default_value = "data/output")]
    output_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize branch inventory/sales files
    Branches {
        /// Process a single branch code (e.g. lv)
        #[arg(long)]
        only: Option<String>,
    },
    /// Normalize the central transfer stock file
    Transfer,
    /// Normalize branches, then the transfer file
    All,
}

fn branch_input_stem(code: BranchCode) -> String {
    format!("{code}_input")
}

/// Probe `<dir>/<stem>.<ext>` for each known extension, first hit wins.
fn resolve_input(dir: &Path, stem: &str) -> Option<PathBuf> {
    INPUT_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|candidate| candidate.is_file())
}

/// Outcome of one branch file, for the run summary.
enum FileOutcome {
    Written(usize),
    MissingInput,
}

fn process_branch(input_dir: &Path, output_dir: &Path, code: BranchCode) -> Result<FileOutcome> {
    let Some(input_path) = resolve_input(input_dir, &branch_input_stem(code)) else {
        return Ok(FileOutcome::MissingInput);
    };

    let grid = read_grid(&input_path)
        .with_context(|| format!("reading {}", input_path.display()))?;
    let clean = normalize_branch_sheet(grid)
        .with_context(|| format!("normalizing {}", input_path.display()))?;

    let output_path = output_dir.join(code.clean_file_name());
    write_sheet(&clean, &output_path)
        .with_context(|| format!("writing {}", output_path.display()))?;

    info!(
        branch = %code,
        rows = clean.rows.len(),
        output = %output_path.display(),
        "wrote clean branch file"
    );
    Ok(FileOutcome::Written(clean.rows.len()))
}

fn run_branches(input_dir: &Path, output_dir: &Path, only: Option<BranchCode>) -> Result<()> {
    let codes: Vec<BranchCode> = match only {
        Some(code) => vec![code],
        None => BranchCode::ALL.to_vec(),
    };

    let mut written = 0usize;
    let mut missing = 0usize;
    let mut failed = 0usize;
    let mut rows_total = 0usize;

    for code in codes {
        match process_branch(input_dir, output_dir, code) {
            Ok(FileOutcome::Written(rows)) => {
                written += 1;
                rows_total += rows;
            }
            Ok(FileOutcome::MissingInput) => {
                info!(branch = %code, "no input file, skipping");
                missing += 1;
            }
            Err(e) => {
                error!(branch = %code, "branch file failed, continuing: {e:#}");
                failed += 1;
            }
        }
    }

    info!(written, missing, failed, rows = rows_total, "branch normalization finished");
    Ok(())
}

fn run_transfer(input_dir: &Path, output_dir: &Path) -> Result<()> {
    let Some(input_path) = resolve_input(input_dir, TRANSFER_INPUT_STEM) else {
        bail!(
            "transfer input not found in {} (tried {}.xlsx/.xls/.csv)",
            input_dir.display(),
            TRANSFER_INPUT_STEM
        );
    };

    let grid = read_grid(&input_path)
        .with_context(|| format!("reading {}", input_path.display()))?;
    let clean = normalize_transfer_sheet(grid)
        .with_context(|| format!("normalizing {}", input_path.display()))?;

    let output_path = output_dir.join(TRANSFER_CLEAN_FILE);
    write_sheet(&clean, &output_path)
        .with_context(|| format!("writing {}", output_path.display()))?;

    info!(
        rows = clean.rows.len(),
        output = %output_path.display(),
        "wrote clean transfer file"
    );
    Ok(())
}

fn parse_only(only: Option<String>) -> Result<Option<BranchCode>> {
    only.as_deref()
        .map(BranchCode::from_str)
        .transpose()
        .map_err(anyhow::Error::msg)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    println!("=== Stock Sheet Normalizer ===");
    println!("Input dir: {}", args.input_dir.display());
    println!("Output dir: {}", args.output_dir.display());

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    match args.command {
        Command::Branches { only } => {
            run_branches(&args.input_dir, &args.output_dir, parse_only(only)?)?
        }
        Command::Transfer => run_transfer(&args.input_dir, &args.output_dir)?,
        Command::All => {
            run_branches(&args.input_dir, &args.output_dir, None)?;
            run_transfer(&args.input_dir, &args.output_dir)?
        }
    }

    println!("\n=== Normalization Complete ===");
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_input_naming() {
        assert_eq!(branch_input_stem(BranchCode::Lv), "lv_input");
        assert_eq!(branch_input_stem(BranchCode::Ck), "ck_input");
    }

    #[test]
    fn test_resolve_input_prefers_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lv_input.xlsx"), b"x").unwrap();
        fs::write(dir.path().join("lv_input.csv"), b"x").unwrap();

        let resolved = resolve_input(dir.path(), "lv_input").unwrap();
        assert_eq!(resolved, dir.path().join("lv_input.xlsx"));
    }

    #[test]
    fn test_resolve_input_falls_back_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hm_input.csv"), b"x").unwrap();

        let resolved = resolve_input(dir.path(), "hm_input").unwrap();
        assert_eq!(resolved, dir.path().join("hm_input.csv"));
    }

    #[test]
    fn test_resolve_input_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_input(dir.path(), "zt_input").is_none());
    }

    #[test]
    fn test_parse_only_accepts_known_codes() {
        assert_eq!(parse_only(None).unwrap(), None);
        assert_eq!(parse_only(Some("lv".into())).unwrap(), Some(BranchCode::Lv));
        assert_eq!(parse_only(Some("CK".into())).unwrap(), Some(BranchCode::Ck));
    }

    #[test]
    fn test_parse_only_rejects_unknown_codes() {
        assert!(parse_only(Some("nope".into())).is_err());
    }

    #[test]
    fn test_missing_branch_input_is_not_an_error() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let outcome = process_branch(input.path(), output.path(), BranchCode::Rb).unwrap();
        assert!(matches!(outcome, FileOutcome::MissingInput));
    }
}
