//! Parse functions - transform raw JSON rows into typed records

use crate::ingestion::error::ParseError;
use crate::ingestion::types::{
    Coordinates, FacilityKind, FacilityRecord, InspectionRecord, PopulationRecord,
};
use crate::ingestion::utils::{lenient_number, lenient_text, split_zip_list, value_text};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Display;
use tracing::{info, warn};

/// ZIP prefixes covering the five boroughs
pub const NYC_ZIP_PREFIXES: [&str; 10] = [
    "100", "101", "102", "103", "104", "111", "112", "113", "114", "116",
];

const POPULATION_COLUMN: &str = "B01003_001E";
const ZCTA_COLUMN: &str = "zip code tabulation area";

/// Rodent inspection row
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InspectionRow {
    #[serde(deserialize_with = "lenient_text")]
    zip_code: Option<String>,

    #[serde(deserialize_with = "lenient_text")]
    inspection_date: Option<String>,

    #[serde(deserialize_with = "lenient_text")]
    inspection_type: Option<String>,
}

/// DSNY garage row
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GarageRow {
    #[serde(deserialize_with = "lenient_text")]
    zip: Option<String>,
}

/// Food scrap drop-off row. Coordinates arrive as strings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DropoffRow {
    #[serde(deserialize_with = "lenient_number")]
    latitude: Option<f64>,

    #[serde(deserialize_with = "lenient_number")]
    longitude: Option<f64>,
}

/// Litter basket row; `point` is a GeoJSON geometry
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LitterBasketRow {
    point: Option<Value>,
}

/// Parks property row
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ParkRow {
    #[serde(deserialize_with = "lenient_text")]
    zipcode: Option<String>,

    #[serde(deserialize_with = "lenient_number")]
    acres: Option<f64>,
}

/// Counts skipped rows, warning only for the first few
struct SkippedRows {
    dataset: &'static str,
    count: usize,
}

impl SkippedRows {
    fn new(dataset: &'static str) -> Self {
        SkippedRows { dataset, count: 0 }
    }

    fn record(&mut self, idx: usize, reason: impl Display) {
        self.count += 1;
        if self.count <= 10 {
            // Only log first 10 errors
            warn!("{}: skipping row {}: {}", self.dataset, idx, reason);
        }
    }
}

/// Deserialize each row into `T`, skipping rows of the wrong shape
fn deserialize_rows<T: DeserializeOwned>(dataset: &'static str, rows: &[Value]) -> Vec<T> {
    let mut parsed = Vec::with_capacity(rows.len());
    let mut skipped = SkippedRows::new(dataset);

    for (idx, row) in rows.iter().enumerate() {
        match T::deserialize(row) {
            Ok(row) => parsed.push(row),
            Err(e) => skipped.record(idx, e),
        }
    }

    info!(
        "Parsed {} {} rows ({} errors)",
        parsed.len(),
        dataset,
        skipped.count
    );
    parsed
}

pub fn is_nyc_zip(zip: &str) -> bool {
    NYC_ZIP_PREFIXES.iter().any(|prefix| zip.starts_with(prefix))
}

/// Inspection rows without a ZIP are dropped
pub fn parse_inspections(rows: &[Value]) -> Vec<InspectionRecord> {
    let parsed: Vec<InspectionRow> = deserialize_rows("inspections", rows);
    let total = parsed.len();

    let records: Vec<InspectionRecord> = parsed
        .into_iter()
        .filter_map(|row| {
            Some(InspectionRecord {
                zip_code: row.zip_code?,
                inspection_date: row.inspection_date,
                inspection_type: row.inspection_type,
            })
        })
        .collect();

    let dropped = total - records.len();
    if dropped > 0 {
        warn!("Dropped {} inspections without a ZIP code", dropped);
    }

    records
}

/// Census responses are arrays of arrays with a header row first.
/// Only NYC ZCTAs are kept.
pub fn parse_population(rows: &[Value]) -> Result<Vec<PopulationRecord>, ParseError> {
    let dataset = "population";
    let header = rows.first().ok_or_else(|| ParseError::MissingHeader {
        dataset: dataset.to_string(),
    })?;

    let column = |name: &str| {
        header
            .as_array()
            .and_then(|cells| cells.iter().position(|cell| cell.as_str() == Some(name)))
            .ok_or_else(|| ParseError::MissingColumn {
                dataset: dataset.to_string(),
                column: name.to_string(),
            })
    };

    let population_idx = column(POPULATION_COLUMN)?;
    let zip_idx = column(ZCTA_COLUMN)?;

    let mut records = Vec::new();
    let mut skipped = SkippedRows::new(dataset);

    for (idx, row) in rows.iter().enumerate().skip(1) {
        let cell = |i: usize| row.get(i).and_then(value_text);

        let Some(zip) = cell(zip_idx) else {
            skipped.record(idx, "no ZCTA code");
            continue;
        };
        if !is_nyc_zip(&zip) {
            continue;
        }

        match cell(population_idx).and_then(|p| p.parse::<i64>().ok()) {
            Some(population) => records.push(PopulationRecord { zip, population }),
            None => skipped.record(idx, format!("no usable population for ZCTA {}", zip)),
        }
    }

    info!(
        "Parsed {} NYC population records ({} errors)",
        records.len(),
        skipped.count
    );

    Ok(records)
}

/// Garages carry an explicit `zip` field
pub fn parse_garages(rows: &[Value]) -> Vec<FacilityRecord> {
    deserialize_rows::<GarageRow>("garages", rows)
        .into_iter()
        .map(|row| {
            let zips = row.zip.map(|z| vec![z]).unwrap_or_default();
            FacilityRecord::with_zips(FacilityKind::Garage, zips)
        })
        .collect()
}

/// Drop-off sites carry `latitude`/`longitude` strings to be geocoded
pub fn parse_dropoffs(rows: &[Value]) -> Vec<FacilityRecord> {
    deserialize_rows::<DropoffRow>("food scrap drop-offs", rows)
        .into_iter()
        .map(|row| {
            let point = Coordinates::from_parts(row.latitude, row.longitude);
            FacilityRecord::with_point(FacilityKind::Dropoff, point)
        })
        .collect()
}

/// Litter baskets carry a GeoJSON `point`, as an object or a JSON string
pub fn parse_litter_baskets(rows: &[Value]) -> Vec<FacilityRecord> {
    deserialize_rows::<LitterBasketRow>("litter baskets", rows)
        .into_iter()
        .map(|row| {
            let point = row.point.as_ref().and_then(point_from_geometry);
            FacilityRecord::with_point(FacilityKind::LitterBasket, point)
        })
        .collect()
}

/// Read a GeoJSON Point geometry. Coordinates are `[longitude, latitude]`.
pub fn point_from_geometry(value: &Value) -> Option<Coordinates> {
    let value = match value {
        Value::String(s) => serde_json::from_str::<Value>(s).ok()?,
        Value::Object(_) => value.clone(),
        _ => return None,
    };

    let geometry = geojson::Geometry::from_json_value(value).ok()?;
    match geometry.value {
        geojson::Value::Point(position) if position.len() >= 2 => {
            Coordinates::from_parts(Some(position[1]), Some(position[0]))
        }
        _ => None,
    }
}

/// Parks list one or more ZIPs in `zipcode` and their size in `acres`
pub fn parse_parks(rows: &[Value]) -> Vec<FacilityRecord> {
    deserialize_rows::<ParkRow>("parks", rows)
        .into_iter()
        .map(|row| FacilityRecord {
            kind: FacilityKind::Park,
            zip_codes: row
                .zipcode
                .map(|raw| split_zip_list(&raw))
                .unwrap_or_default(),
            point: None,
            acres: row.acres,
        })
        .collect()
}
