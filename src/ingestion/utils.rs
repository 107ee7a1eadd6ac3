//! Utility functions for common operations

use anyhow::Result;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Download a file via HTTP
pub async fn http_get(url: &str, timeout: Duration) -> Result<Bytes> {
    info!("Downloading from {}", url);
    let client = Client::builder().timeout(timeout).build()?;

    let response = client.get(url).send().await?;
    let status = response.status();

    if !status.is_success() {
        return Err(anyhow::anyhow!("HTTP request failed: {}", status));
    }

    let bytes = response.bytes().await?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes)
}

/// Extract the named file from a ZIP archive into the archive's directory
pub fn extract_from_zip(zip_path: &Path, wanted: &str) -> Result<PathBuf> {
    info!("Extracting {} from {:?}", wanted, zip_path);

    let file = fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();

        if Path::new(&name).file_name().and_then(|n| n.to_str()) == Some(wanted) {
            let output_dir = zip_path.parent().unwrap_or_else(|| Path::new("."));
            let output_path = output_dir.join(wanted);

            let mut output_file = fs::File::create(&output_path)?;
            io::copy(&mut entry, &mut output_file)?;

            info!("Extracted to {:?}", output_path);
            return Ok(output_path);
        }
    }

    Err(anyhow::anyhow!("No {} found in ZIP archive", wanted))
}

/// Render a JSON scalar as trimmed text. Numbers are rendered as written;
/// empty strings and nulls count as missing.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a JSON scalar as a finite float, coercing unparseable values to missing
pub fn value_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_float(s),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// `deserialize_with` helper: any scalar as optional trimmed text
pub fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_text(&Value::deserialize(deserializer)?))
}

/// `deserialize_with` helper: a number or numeric string as an optional float
pub fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_number(&Value::deserialize(deserializer)?))
}

pub fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Split a comma-separated ZIP field, trimming each entry and dropping empties
pub fn split_zip_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|zip| !zip.is_empty())
        .map(str::to_string)
        .collect()
}
