//! Loader Service - Upserts clean workbooks into the MySQL store
//!
//! Responsibilities:
//! - Read `<code>_clean.xlsx` / `products_transfer_clean.xlsx` written by the normalizer
//! - Assemble typed records and substitute sentinels (0, 1900-01-01)
//! - Batch-upsert into `branch_metrics` (keyed branch_code + barcode) and
//!   `products_transfer` (keyed barcode), one transaction per file
//! - Record every database write in the `import_runs` ledger
//!
//! Expected tables:
//!   branch_metrics(branch_code, barcode, sales_prev_month, sales_current_month,
//!                  sales_period, sales_from_warehouses, stock_balance,
//!                  last_movement_date, UNIQUE(branch_code, barcode))
//!   products_transfer(barcode PRIMARY KEY, name, stock_total, stock_central,
//!                     last_purchase_date)
//!   import_runs(run_id, component, source_file, branch_code, status,
//!               records_loaded, error, started_at, finished_at, detail)
//!
//! A structurally broken branch clean file is logged and skipped; a database
//! error aborts the run after rolling back the current file's transaction.
//! Transfer failures of any kind abort the run.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{error, info};
use uuid::Uuid;

use sheetnorm::fields::SENTINEL_DATE;
use sheetnorm::grid::{read_grid, Sheet};
use sheetnorm::schema::TRANSFER_CLEAN_FILE;
use sheetnorm::{
    assemble_branch_records, assemble_transfer_records, BranchCode, BranchRecord, SheetError,
    TransferRecord,
};

/// Rows bound per INSERT statement. MySQL's default max_allowed_packet
/// comfortably fits 500 rows of these widths.
const UPSERT_CHUNK: usize = 500;

#[derive(Parser, Debug)]
#[command(
    name = "loader",
    about = "Loads clean branch and transfer workbooks into MySQL"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory containing clean workbooks
    #[arg(long, default_value = "data/output")]
    clean_dir: PathBuf,

    /// Parse and preview records without touching the database
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load branch metric files
    Branches {
        /// Load a single branch code (e.g. lv)
        #[arg(long)]
        only: Option<String>,
    },
    /// Load the transfer stock file
    Transfer,
    /// Load branches, then the transfer file
    All,
}

#[derive(Debug, Clone)]
struct DbConfig {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: String,
}

impl DbConfig {
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            host: lookup("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: lookup("DB_PORT").and_then(|p| p.parse().ok()).unwrap_or(3306),
            user: lookup("DB_USER").context("DB_USER env var missing")?,
            password: lookup("DB_PASSWORD").context("DB_PASSWORD env var missing")?,
            database: lookup("DB_NAME").context("DB_NAME env var missing")?,
        })
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .charset("utf8mb4")
    }
}

// =============================================================================
// CLEAN FILE READING
// =============================================================================

fn read_branch_records(path: &Path, code: BranchCode) -> Result<Vec<BranchRecord>> {
    let grid = read_grid(path).with_context(|| format!("reading {}", path.display()))?;
    let sheet = Sheet::from_grid(grid, 0);
    assemble_branch_records(&sheet, code)
        .with_context(|| format!("assembling records from {}", path.display()))
}

fn read_transfer_records(path: &Path) -> Result<Vec<TransferRecord>> {
    let grid = read_grid(path).with_context(|| format!("reading {}", path.display()))?;
    let sheet = Sheet::from_grid(grid, 0);
    assemble_transfer_records(&sheet)
        .with_context(|| format!("assembling records from {}", path.display()))
}

// =============================================================================
// UPSERT STATEMENTS
// =============================================================================

/// Build one multi-row upsert for a chunk of branch records. `None` metrics
/// become their sentinels here, at the last possible moment before the store.
fn branch_upsert_query<'args>(records: &'args [BranchRecord]) -> QueryBuilder<'args, MySql> {
    let mut qb = QueryBuilder::new(
        "INSERT INTO branch_metrics \
         (branch_code, barcode, sales_prev_month, sales_current_month, sales_period, \
         sales_from_warehouses, stock_balance, last_movement_date) ",
    );
    qb.push_values(records, |mut b, rec| {
        b.push_bind(rec.branch_code.as_str())
            .push_bind(rec.barcode.as_str())
            .push_bind(rec.sales_prev_month.unwrap_or(0))
            .push_bind(rec.sales_current_month.unwrap_or(0))
            .push_bind(rec.sales_period.unwrap_or(0))
            .push_bind(rec.sales_from_warehouses.unwrap_or(0))
            .push_bind(rec.stock_balance.unwrap_or(0))
            .push_bind(rec.last_movement_date.unwrap_or(*SENTINEL_DATE));
    });
    qb.push(
        " ON DUPLICATE KEY UPDATE \
         sales_prev_month = VALUES(sales_prev_month), \
         sales_current_month = VALUES(sales_current_month), \
         sales_period = VALUES(sales_period), \
         sales_from_warehouses = VALUES(sales_from_warehouses), \
         stock_balance = VALUES(stock_balance), \
         last_movement_date = VALUES(last_movement_date)",
    );
    qb
}

fn transfer_upsert_query<'args>(records: &'args [TransferRecord]) -> QueryBuilder<'args, MySql> {
    let mut qb = QueryBuilder::new(
        "INSERT INTO products_transfer \
         (barcode, name, stock_total, stock_central, last_purchase_date) ",
    );
    qb.push_values(records, |mut b, rec| {
        b.push_bind(rec.barcode.as_str())
            .push_bind(rec.name.as_deref())
            .push_bind(rec.stock_total.unwrap_or(0))
            .push_bind(rec.stock_central.unwrap_or(0))
            .push_bind(rec.last_purchase_date.unwrap_or(*SENTINEL_DATE));
    });
    qb.push(
        " ON DUPLICATE KEY UPDATE \
         name = VALUES(name), \
         stock_total = VALUES(stock_total), \
         stock_central = VALUES(stock_central), \
         last_purchase_date = VALUES(last_purchase_date)",
    );
    qb
}

/// Upsert all records inside one transaction, chunked. A failure anywhere
/// rolls the whole file back.
async fn upsert_branch_records(pool: &MySqlPool, records: &[BranchRecord]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut affected = 0u64;
    for chunk in records.chunks(UPSERT_CHUNK) {
        let mut qb = branch_upsert_query(chunk);
        let result = qb.build().execute(&mut *tx).await?;
        affected += result.rows_affected();
    }
    tx.commit().await?;
    Ok(affected)
}

async fn upsert_transfer_records(pool: &MySqlPool, records: &[TransferRecord]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut affected = 0u64;
    for chunk in records.chunks(UPSERT_CHUNK) {
        let mut qb = transfer_upsert_query(chunk);
        let result = qb.build().execute(&mut *tx).await?;
        affected += result.rows_affected();
    }
    tx.commit().await?;
    Ok(affected)
}

// =============================================================================
// IMPORT RUN LEDGER
// =============================================================================

/// Create an import run record. Ledger writes sit outside the record
/// transaction: a failed load must still leave its 'failed' row behind.
async fn create_import_run(
    pool: &MySqlPool,
    source_file: &str,
    branch: Option<BranchCode>,
) -> Result<Uuid> {
    let run_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO import_runs (run_id, component, source_file, branch_code, status, started_at, detail)
        VALUES (?, 'loader', ?, ?, 'running', NOW(), '{}')
        "#,
    )
    .bind(run_id.to_string())
    .bind(source_file)
    .bind(branch.map(|b| b.as_str()))
    .execute(pool)
    .await?;
    Ok(run_id)
}

async fn finish_import_run(
    pool: &MySqlPool,
    run_id: Uuid,
    status: &str,
    records_loaded: u64,
    error: Option<&str>,
    detail: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE import_runs
        SET finished_at = NOW(), status = ?, records_loaded = ?, error = ?, detail = ?
        WHERE run_id = ?
        "#,
    )
    .bind(status)
    .bind(records_loaded as i64)
    .bind(error)
    .bind(detail.to_string())
    .bind(run_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

// =============================================================================
// FILE LOADING
// =============================================================================

fn source_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn preview_records<T: Serialize>(records: &[T]) -> Result<()> {
    for rec in records.iter().take(3) {
        info!(sample = %serde_json::to_string(rec)?, "dry-run record");
    }
    if records.len() > 3 {
        info!(more = records.len() - 3, "further records omitted");
    }
    Ok(())
}

async fn load_branch_file(
    pool: Option<&MySqlPool>,
    path: &Path,
    code: BranchCode,
) -> Result<u64> {
    let Some(pool) = pool else {
        let records = read_branch_records(path, code)?;
        preview_records(&records)?;
        info!(branch = %code, records = records.len(), "dry run, nothing written");
        return Ok(records.len() as u64);
    };

    let source_file = source_file_name(path);
    let run_id = create_import_run(pool, &source_file, Some(code)).await?;

    let outcome = async {
        let records = read_branch_records(path, code)?;
        let affected = upsert_branch_records(pool, &records).await?;
        Ok::<(usize, u64), anyhow::Error>((records.len(), affected))
    }
    .await;

    match &outcome {
        Ok((count, affected)) => {
            let detail = serde_json::json!({
                "source_file": source_file,
                "rows_affected": affected,
            });
            finish_import_run(pool, run_id, "ok", *count as u64, None, &detail).await?;
        }
        Err(e) => {
            let detail = serde_json::json!({ "source_file": source_file });
            finish_import_run(pool, run_id, "failed", 0, Some(&format!("{e:#}")), &detail)
                .await?;
        }
    }

    let (count, affected) = outcome?;
    info!(branch = %code, records = count, rows_affected = affected, "loaded branch file");
    Ok(count as u64)
}

async fn load_transfer_file(pool: Option<&MySqlPool>, path: &Path) -> Result<u64> {
    let Some(pool) = pool else {
        let records = read_transfer_records(path)?;
        preview_records(&records)?;
        info!(records = records.len(), "dry run, nothing written");
        return Ok(records.len() as u64);
    };

    let source_file = source_file_name(path);
    let run_id = create_import_run(pool, &source_file, None).await?;

    let outcome = async {
        let records = read_transfer_records(path)?;
        let affected = upsert_transfer_records(pool, &records).await?;
        Ok::<(usize, u64), anyhow::Error>((records.len(), affected))
    }
    .await;

    match &outcome {
        Ok((count, affected)) => {
            let detail = serde_json::json!({
                "source_file": source_file,
                "rows_affected": affected,
            });
            finish_import_run(pool, run_id, "ok", *count as u64, None, &detail).await?;
        }
        Err(e) => {
            let detail = serde_json::json!({ "source_file": source_file });
            finish_import_run(pool, run_id, "failed", 0, Some(&format!("{e:#}")), &detail)
                .await?;
        }
    }

    let (count, affected) = outcome?;
    info!(records = count, rows_affected = affected, "loaded transfer file");
    Ok(count as u64)
}

// =============================================================================
// RUNS
// =============================================================================

async fn run_branches(
    clean_dir: &Path,
    pool: Option<&MySqlPool>,
    only: Option<BranchCode>,
) -> Result<()> {
    let codes: Vec<BranchCode> = match only {
        Some(code) => vec![code],
        None => BranchCode::ALL.to_vec(),
    };

    let mut loaded = 0usize;
    let mut missing = 0usize;
    let mut failed = 0usize;
    let mut records_total = 0u64;

    for code in codes {
        let path = clean_dir.join(code.clean_file_name());
        if !path.is_file() {
            info!(branch = %code, "no clean file, skipping");
            missing += 1;
            continue;
        }

        match load_branch_file(pool, &path, code).await {
            Ok(records) => {
                loaded += 1;
                records_total += records;
            }
            // Structural problems stay contained to this file. Anything
            // else is a database failure and aborts the run.
            Err(e) if e.downcast_ref::<SheetError>().is_some() => {
                error!(branch = %code, "clean file failed, continuing: {e:#}");
                failed += 1;
            }
            Err(e) => {
                return Err(e.context(format!("loading branch {code}")));
            }
        }
    }

    info!(loaded, missing, failed, records = records_total, "branch load finished");
    Ok(())
}

async fn run_transfer(clean_dir: &Path, pool: Option<&MySqlPool>) -> Result<()> {
    let path = clean_dir.join(TRANSFER_CLEAN_FILE);
    if !path.is_file() {
        bail!("transfer clean file not found: {}", path.display());
    }

    let records = load_transfer_file(pool, &path).await?;
    info!(records, "transfer load finished");
    Ok(())
}

fn parse_only(only: Option<String>) -> Result<Option<BranchCode>> {
    only.as_deref()
        .map(BranchCode::from_str)
        .transpose()
        .map_err(anyhow::Error::msg)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    println!("=== Warehouse Loader ===");
    println!("Clean dir: {}", args.clean_dir.display());
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });

    let pool = if args.dry_run {
        None
    } else {
        let db = DbConfig::from_env()?;
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect_with(db.connect_options())
            .await
            .context("connecting to MySQL")?;
        Some(pool)
    };

    match args.command {
        Command::Branches { only } => {
            run_branches(&args.clean_dir, pool.as_ref(), parse_only(only)?).await?
        }
        Command::Transfer => run_transfer(&args.clean_dir, pool.as_ref()).await?,
        Command::All => {
            run_branches(&args.clean_dir, pool.as_ref(), None).await?;
            run_transfer(&args.clean_dir, pool.as_ref()).await?
        }
    }

    println!("\n=== Load Complete ===");
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sqlx=warn".into()),
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
    use chrono::NaiveDate;

    fn branch_record(barcode: &str) -> BranchRecord {
        BranchRecord {
            branch_code: BranchCode::Lv,
            barcode: barcode.to_string(),
            sales_prev_month: Some(3),
            sales_current_month: Some(4),
            sales_period: Some(10),
            sales_from_warehouses: None,
            stock_balance: Some(5),
            last_movement_date: NaiveDate::from_ymd_opt(2024, 3, 15),
        }
    }

    fn transfer_record(barcode: &str) -> TransferRecord {
        TransferRecord {
            barcode: barcode.to_string(),
            name: Some("Чай зеленый".to_string()),
            stock_total: Some(20),
            stock_central: None,
            last_purchase_date: None,
        }
    }

    // -------------------------------------------------------------------------
    // UPSERT SQL SHAPE
    // -------------------------------------------------------------------------

    #[test]
    fn test_branch_upsert_sql_shape() {
        let records = vec![branch_record("111"), branch_record("222")];
        let qb = branch_upsert_query(&records);
        let sql = qb.sql();

        assert!(sql.starts_with("INSERT INTO branch_metrics"));
        assert!(sql.contains("ON DUPLICATE KEY UPDATE"));
        assert!(sql.contains("stock_balance = VALUES(stock_balance)"));
        // One placeholder tuple per record, eight binds each.
        assert_eq!(sql.matches("(?, ?, ?, ?, ?, ?, ?, ?)").count(), 2);
    }

    #[test]
    fn test_branch_upsert_never_touches_keys_on_update() {
        let records = vec![branch_record("111")];
        let qb = branch_upsert_query(&records);
        let update_clause = qb
            .sql()
            .split_once("ON DUPLICATE KEY UPDATE")
            .map(|(_, tail)| tail.to_string())
            .unwrap_or_default();
        assert!(!update_clause.contains("barcode ="));
        assert!(!update_clause.contains("branch_code ="));
    }

    #[test]
    fn test_transfer_upsert_sql_shape() {
        let records = vec![transfer_record("111")];
        let qb = transfer_upsert_query(&records);
        let sql = qb.sql();

        assert!(sql.starts_with("INSERT INTO products_transfer"));
        assert!(sql.contains("name = VALUES(name)"));
        assert!(sql.contains("last_purchase_date = VALUES(last_purchase_date)"));
        assert_eq!(sql.matches("(?, ?, ?, ?, ?)").count(), 1);
    }

    #[test]
    fn test_chunking_covers_all_records() {
        let records: Vec<BranchRecord> =
            (0..1201).map(|i| branch_record(&i.to_string())).collect();
        let chunks: Vec<_> = records.chunks(UPSERT_CHUNK).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 1201);
    }

    // -------------------------------------------------------------------------
    // CONFIG
    // -------------------------------------------------------------------------

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::from_lookup(|key| match key {
            "DB_USER" => Some("app".to_string()),
            "DB_PASSWORD" => Some("secret".to_string()),
            "DB_NAME" => Some("warehouse".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.database, "warehouse");
    }

    #[test]
    fn test_db_config_requires_credentials() {
        let err = DbConfig::from_lookup(|_| None).unwrap_err();
        assert!(err.to_string().contains("DB_USER"));
    }

    #[test]
    fn test_db_config_custom_port() {
        let config = DbConfig::from_lookup(|key| match key {
            "DB_USER" => Some("app".to_string()),
            "DB_PASSWORD" => Some("secret".to_string()),
            "DB_NAME" => Some("warehouse".to_string()),
            "DB_PORT" => Some("3307".to_string()),
            "DB_HOST" => Some("db.internal".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.port, 3307);
        assert_eq!(config.host, "db.internal");
    }

    #[test]
    fn test_db_config_bad_port_falls_back() {
        let config = DbConfig::from_lookup(|key| match key {
            "DB_USER" => Some("app".to_string()),
            "DB_PASSWORD" => Some("secret".to_string()),
            "DB_NAME" => Some("warehouse".to_string()),
            "DB_PORT" => Some("not-a-port".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.port, 3306);
    }

    // -------------------------------------------------------------------------
    // SENTINEL SUBSTITUTION
    // -------------------------------------------------------------------------

    #[test]
    fn test_missing_values_get_sentinels_at_bind_time() {
        // The record keeps None; only the bound value carries the sentinel.
        let rec = transfer_record("111");
        assert_eq!(rec.stock_central, None);
        assert_eq!(rec.stock_central.unwrap_or(0), 0);
        assert_eq!(
            rec.last_purchase_date.unwrap_or(*SENTINEL_DATE),
            NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_parse_only_matches_normalizer_behavior() {
        assert_eq!(parse_only(Some("lv".into())).unwrap(), Some(BranchCode::Lv));
        assert!(parse_only(Some("xx".into())).is_err());
        assert_eq!(parse_only(None).unwrap(), None);
    }
}
