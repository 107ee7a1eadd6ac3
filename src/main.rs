//! Dataset builder - runs fetch, geocode, aggregate, write

use anyhow::{Context, Result};
use clap::Parser;
use rodent_zip_dataset::ingestion::{aggregate, fetch, geocode, write};
use rodent_zip_dataset::Config;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Build the per-ZIP rodent inspection regression dataset for NYC
#[derive(Parser, Debug)]
#[command(name = "build-dataset", version, about)]
struct Cli {
    /// CSV file to write (overrides OUTPUT_PATH)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Calendar year of inspections to count (overrides INSPECTION_YEAR)
    #[arg(long)]
    inspection_year: Option<i32>,

    /// Local GeoNames US.txt or US.zip (overrides GAZETTEER_PATH)
    #[arg(long)]
    gazetteer: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    info!("Starting regression dataset build");

    // Load configuration from environment
    dotenvy::dotenv().ok();
    let mut config = Config::from_env()?;
    if let Some(output) = cli.output {
        config.output_path = output;
    }
    if let Some(year) = cli.inspection_year {
        config.inspection_year = year;
    }
    if let Some(path) = cli.gazetteer {
        config.gazetteer_path = Some(path);
    }
    config.inspection_window()?;
    info!("Configuration loaded");

    info!("Step 1/4: Fetching sources...");
    let source = fetch::HttpSource::new(&config)?;
    let inputs = fetch::fetch_all(&source, &config).await?;
    info!("✓ Fetch complete");

    info!("Step 2/4: Loading gazetteer...");
    let gazetteer_path = geocode::fetch_gazetteer(&config).await?;
    let table = geocode::load_reference_table(&gazetteer_path)
        .context("gazetteer: failed to build reference table")?;

    info!("Step 3/4: Aggregating by ZIP code...");
    let (rows, stats) = aggregate::build_regression_rows(&inputs, &table);
    info!("✓ Joined {} ZIP codes ({} dropped)", stats.joined, stats.dropped_without_population);

    info!("Step 4/4: Writing CSV...");
    let written = write::write_csv(&config.output_path, &rows)?;
    write::log_preview(&rows, 5);

    info!("✓ Dataset written to {:?} ({})", config.output_path, written);

    Ok(())
}
