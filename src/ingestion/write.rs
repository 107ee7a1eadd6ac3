//! Write functions - serialize the regression dataset to CSV

use crate::ingestion::types::{RegressionRow, WriteStats};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Write rows as CSV (header row, no index column) to any writer
pub fn write_rows<W: Write>(writer: W, rows: &[RegressionRow]) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(writer);

    for row in rows {
        writer.serialize(row)?;
    }

    // Header comes from the first serialized row; emit it explicitly when empty
    if rows.is_empty() {
        writer.write_record([
            "zip_code",
            "inspections",
            "population",
            "has_garage",
            "has_dropoff",
            "litter_basket_count",
            "total_park_acres",
        ])?;
    }

    writer.flush()?;
    Ok(rows.len())
}

/// Write the dataset to a CSV file, creating parent directories as needed
pub fn write_csv(path: &Path, rows: &[RegressionRow]) -> Result<WriteStats> {
    info!("Writing {} rows to {:?}", rows.len(), path);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file =
        fs::File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let written = write_rows(file, rows)?;

    let stats = WriteStats {
        rows: written,
        bytes: fs::metadata(path)?.len(),
    };
    info!("Write complete: {}", stats);

    Ok(stats)
}

/// Log the first few rows, like a dataframe preview
pub fn log_preview(rows: &[RegressionRow], limit: usize) {
    for row in rows.iter().take(limit) {
        info!(
            "{} inspections={} population={} garage={} dropoff={} baskets={} park_acres={}",
            row.zip_code,
            row.inspections,
            row.population,
            row.has_garage,
            row.has_dropoff,
            row.litter_basket_count,
            row.total_park_acres
        );
    }
    info!("{} rows", rows.len());
}
