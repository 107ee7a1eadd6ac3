//! Nearest-ZIP resolution against the GeoNames postal-code gazetteer

use crate::config::Config;
use crate::ingestion::types::{Coordinates, ReferencePoint};
use crate::ingestion::utils::{extract_from_zip, http_get, parse_float};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Name of the US dump inside the GeoNames archive
const GAZETTEER_ENTRY: &str = "US.txt";

// GeoNames columns: country, postal code, place, admin1 name, admin1 code,
// admin2 name, admin2 code, admin3 name, admin3 code, lat, lon, accuracy
const POSTAL_CODE_COLUMN: usize = 1;
const LATITUDE_COLUMN: usize = 9;
const LONGITUDE_COLUMN: usize = 10;

/// Reference points ordered by ZIP, one point per ZIP
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    points: Vec<ReferencePoint>,
}

impl ReferenceTable {
    /// Collapse duplicate ZIPs to their mean coordinates and order by ZIP
    pub fn from_points(points: impl IntoIterator<Item = ReferencePoint>) -> Self {
        let mut grouped: BTreeMap<String, (f64, f64, usize)> = BTreeMap::new();

        for point in points {
            let entry = grouped.entry(point.zip).or_insert((0.0, 0.0, 0));
            entry.0 += point.latitude;
            entry.1 += point.longitude;
            entry.2 += 1;
        }

        let points = grouped
            .into_iter()
            .map(|(zip, (lat_sum, lon_sum, n))| ReferencePoint {
                zip,
                latitude: lat_sum / n as f64,
                longitude: lon_sum / n as f64,
            })
            .collect();

        ReferenceTable { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ReferencePoint] {
        &self.points
    }

    /// Closest reference point by planar Euclidean distance on raw degrees.
    /// Ties go to the first point in table order (lowest ZIP).
    pub fn nearest(&self, query: Coordinates) -> Option<&ReferencePoint> {
        let mut best: Option<(&ReferencePoint, f64)> = None;

        for point in &self.points {
            let d_lat = point.latitude - query.latitude;
            let d_lon = point.longitude - query.longitude;
            let distance = (d_lat * d_lat + d_lon * d_lon).sqrt();

            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((point, distance)),
            }
        }

        best.map(|(point, _)| point)
    }

    /// ZIP of the nearest reference point, or None when a coordinate is
    /// missing or not finite (or the table is empty)
    pub fn resolve(&self, latitude: Option<f64>, longitude: Option<f64>) -> Option<&str> {
        let query = Coordinates::from_parts(latitude, longitude)?;
        self.nearest(query).map(|point| point.zip.as_str())
    }
}

/// Parse a GeoNames tab-separated dump into reference points
pub fn parse_gazetteer<R: Read>(reader: R) -> Result<Vec<ReferencePoint>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(reader);

    let mut points = Vec::new();
    let mut skipped = 0;

    for result in reader.records() {
        let record = result?;

        let zip = record.get(POSTAL_CODE_COLUMN).map(str::trim).unwrap_or("");
        let latitude = record.get(LATITUDE_COLUMN).and_then(parse_float);
        let longitude = record.get(LONGITUDE_COLUMN).and_then(parse_float);

        match (zip.is_empty(), latitude, longitude) {
            (false, Some(latitude), Some(longitude)) => points.push(ReferencePoint {
                zip: zip.to_string(),
                latitude,
                longitude,
            }),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} gazetteer rows without usable coordinates", skipped);
    }

    Ok(points)
}

/// Load a reference table from a `.txt` dump or a GeoNames `.zip` archive
pub fn load_reference_table(path: &Path) -> Result<ReferenceTable> {
    let txt_path = if path.extension().is_some_and(|ext| ext == "zip") {
        extract_from_zip(path, GAZETTEER_ENTRY)?
    } else {
        path.to_path_buf()
    };

    info!("Loading gazetteer from {:?}", txt_path);
    let file = fs::File::open(&txt_path)
        .with_context(|| format!("Failed to open gazetteer {:?}", txt_path))?;
    let points = parse_gazetteer(file)?;
    let table = ReferenceTable::from_points(points);

    info!("Gazetteer holds {} ZIP codes", table.len());
    Ok(table)
}

/// Locate the gazetteer: the configured local path, or a fresh download
pub async fn fetch_gazetteer(config: &Config) -> Result<PathBuf> {
    if let Some(path) = &config.gazetteer_path {
        info!("Using local gazetteer {:?}", path);
        return Ok(path.clone());
    }

    fs::create_dir_all(&config.temp_dir)?;

    let bytes = http_get(&config.gazetteer_url, config.request_timeout)
        .await
        .with_context(|| format!("gazetteer: download from {} failed", config.gazetteer_url))?;

    let zip_path = config.temp_dir.join("US.zip");
    fs::write(&zip_path, &bytes)?;
    info!("Saved ZIP to {:?}", zip_path);

    Ok(zip_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn point(zip: &str, latitude: f64, longitude: f64) -> ReferencePoint {
        ReferencePoint {
            zip: zip.to_string(),
            latitude,
            longitude,
        }
    }

    fn manhattan() -> ReferenceTable {
        ReferenceTable::from_points(vec![
            point("10001", 40.7506, -73.9972),
            point("10002", 40.7157, -73.9863),
            point("10003", 40.7318, -73.9885),
            point("10451", 40.8200, -73.9236),
        ])
    }

    #[test]
    fn test_resolve_picks_nearest() {
        let table = manhattan();

        assert_eq!(table.resolve(Some(40.7510), Some(-73.9970)), Some("10001"));
        assert_eq!(table.resolve(Some(40.7160), Some(-73.9860)), Some("10002"));
        assert_eq!(table.resolve(Some(40.9000), Some(-73.9000)), Some("10451"));
    }

    #[test]
    fn test_resolve_no_point_is_strictly_closer() {
        let table = manhattan();
        let queries = [(40.70, -74.02), (40.74, -73.99), (40.80, -73.95), (41.0, -73.0)];

        for (lat, lon) in queries {
            let zip = table.resolve(Some(lat), Some(lon)).unwrap();
            let chosen = table.points().iter().find(|p| p.zip == zip).unwrap();
            let distance = |p: &ReferencePoint| {
                ((p.latitude - lat).powi(2) + (p.longitude - lon).powi(2)).sqrt()
            };

            for other in table.points() {
                assert!(distance(other) >= distance(chosen));
            }
        }
    }

    #[test]
    fn test_resolve_missing_coordinates() {
        let table = manhattan();

        assert_eq!(table.resolve(None, Some(-73.99)), None);
        assert_eq!(table.resolve(Some(40.75), None), None);
        assert_eq!(table.resolve(Some(f64::NAN), Some(-73.99)), None);
        assert_eq!(ReferenceTable::default().resolve(Some(40.75), Some(-73.99)), None);
    }

    #[test]
    fn test_planar_not_geodesic() {
        // 1 degree of longitude is shorter on the ground than 1 degree of
        // latitude at NYC, but the planar metric treats them equally.
        let table = ReferenceTable::from_points(vec![
            point("11111", 41.0, 0.0),
            point("22222", 40.0, 1.01),
        ]);

        assert_eq!(table.resolve(Some(40.0), Some(0.0)), Some("11111"));
    }

    #[test]
    fn test_tie_goes_to_lowest_zip() {
        let table = ReferenceTable::from_points(vec![
            point("10020", 40.0, -73.0),
            point("10010", 40.0, -75.0),
        ]);

        assert_eq!(table.resolve(Some(40.0), Some(-74.0)), Some("10010"));
    }

    #[test]
    fn test_from_points_averages_duplicates() {
        let table = ReferenceTable::from_points(vec![
            point("10002", 40.0, -74.0),
            point("10001", 40.5, -73.5),
            point("10002", 41.0, -73.0),
        ]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.points()[0].zip, "10001");
        assert_eq!(table.points()[1], point("10002", 40.5, -73.5));
    }

    #[test]
    fn test_parse_gazetteer() {
        let data = "US\t10001\tNew York\tNew York\tNY\tNew York\t061\t\t\t40.7484\t-73.9967\t4\n\
                    US\t99999\tNowhere\t\t\t\t\t\t\t\t\t\n\
                    US\t07030\tHoboken\tNew Jersey\tNJ\tHudson\t017\t\t\t40.745\t-74.0279\t4\n";

        let points = parse_gazetteer(data.as_bytes()).unwrap();

        assert_eq!(
            points,
            vec![point("10001", 40.7484, -73.9967), point("07030", 40.745, -74.0279)]
        );
    }

    #[test]
    fn test_load_reference_table_from_txt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("US.txt");
        fs::write(
            &path,
            "US\t10002\tNew York\tNew York\tNY\t\t\t\t\t40.7157\t-73.9863\t4\n\
             US\t10001\tNew York\tNew York\tNY\t\t\t\t\t40.7484\t-73.9967\t4\n",
        )
        .unwrap();

        let table = load_reference_table(&path).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.points()[0].zip, "10001");
    }
}
