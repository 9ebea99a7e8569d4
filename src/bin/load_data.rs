//! Loads a folder of CSV exports into the SQLite database used by askchambre
//!
//! Run with: cargo run --bin load_data -- --csv-dir data/

use anyhow::{Context, Result};
use askchambre::config::AppConfig;
use askchambre::db::SqliteGateway;
use askchambre::ingest;
use clap::Parser;
use rusqlite::Connection;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "load_data")]
#[command(about = "Load CSV files into the query database, one table per file")]
struct Args {
    /// Folder scanned recursively for *.csv files
    #[arg(long)]
    csv_dir: PathBuf,

    /// Target SQLite file, created when missing (or set DATABASE_PATH)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Leave the etat_travaux.nature codes untouched
    #[arg(long)]
    skip_normalize: bool,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env()?;
    let database = args.database.unwrap_or(config.database_path);

    println!("📂 Loading CSV files from {}", args.csv_dir.display());
    let mut conn = Connection::open(&database)
        .with_context(|| format!("opening {}", database.display()))?;
    let loaded = ingest::load_csv_dir(&mut conn, &args.csv_dir)?;
    drop(conn);

    for table in &loaded {
        println!(
            "   ✓ {} -> {} ({} rows, {} columns)",
            table.source.display(),
            table.table,
            table.rows,
            table.columns.len()
        );
    }
    println!("✅ Loaded {} tables into {}", loaded.len(), database.display());

    if args.skip_normalize {
        return Ok(());
    }
    if !loaded.iter().any(|t| t.table == ingest::NATURE_TABLE) {
        println!("ℹ️  No {} table loaded, label normalization skipped", ingest::NATURE_TABLE);
        return Ok(());
    }

    let gateway = SqliteGateway::open(&database).with_busy_timeout(config.busy_timeout);
    let updated = ingest::normalize_nature_labels(&gateway)?;
    println!("✅ Normalized nature labels on {} rows", updated);
    Ok(())
}
