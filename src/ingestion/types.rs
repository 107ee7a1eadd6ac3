//! Core data types for the ingestion pipeline
//! Pure data structures with no behavior

use serde::Serialize;
use std::fmt;

/// Raw rows as returned by a tabular source (one JSON value per row)
pub type Rows = Vec<serde_json::Value>;

/// Facility datasets joined onto the base table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacilityKind {
    Garage,
    Dropoff,
    LitterBasket,
    Park,
}

impl fmt::Display for FacilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacilityKind::Garage => write!(f, "garages"),
            FacilityKind::Dropoff => write!(f, "food scrap drop-offs"),
            FacilityKind::LitterBasket => write!(f, "litter baskets"),
            FacilityKind::Park => write!(f, "parks"),
        }
    }
}

/// A single qualifying rodent inspection
#[derive(Debug, Clone, PartialEq)]
pub struct InspectionRecord {
    pub zip_code: String,
    pub inspection_date: Option<String>,
    pub inspection_type: Option<String>,
}

/// Total population of one ZIP code tabulation area
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationRecord {
    pub zip: String,
    pub population: i64,
}

/// A latitude/longitude pair. Both values are finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build from optional parts, rejecting missing or non-finite values
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) if latitude.is_finite() && longitude.is_finite() => {
                Some(Coordinates {
                    latitude,
                    longitude,
                })
            }
            _ => None,
        }
    }
}

/// Garage, drop-off site, litter basket or park.
///
/// A record locates itself either through explicit ZIP codes or through a
/// point that still has to be resolved against the gazetteer.
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityRecord {
    pub kind: FacilityKind,
    pub zip_codes: Vec<String>,
    pub point: Option<Coordinates>,
    pub acres: Option<f64>,
}

impl FacilityRecord {
    pub fn with_zips(kind: FacilityKind, zip_codes: Vec<String>) -> Self {
        FacilityRecord {
            kind,
            zip_codes,
            point: None,
            acres: None,
        }
    }

    pub fn with_point(kind: FacilityKind, point: Option<Coordinates>) -> Self {
        FacilityRecord {
            kind,
            zip_codes: Vec::new(),
            point,
            acres: None,
        }
    }
}

/// Gazetteer entry used for nearest-ZIP resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePoint {
    pub zip: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Everything the join needs, fetched and parsed
#[derive(Debug, Clone, Default)]
pub struct RegressionInputs {
    pub inspections: Vec<InspectionRecord>,
    pub population: Vec<PopulationRecord>,
    pub garages: Vec<FacilityRecord>,
    pub dropoffs: Vec<FacilityRecord>,
    pub litter_baskets: Vec<FacilityRecord>,
    pub parks: Vec<FacilityRecord>,
}

/// One output row of the regression dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionRow {
    pub zip_code: String,
    pub inspections: u64,
    pub population: i64,
    pub has_garage: u8,
    pub has_dropoff: u8,
    pub litter_basket_count: u64,
    pub total_park_acres: f64,
}

/// Outcome of resolving one facility source to ZIP codes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveStats {
    pub explicit: usize,
    pub geocoded: usize,
    pub missed: usize,
}

impl fmt::Display for ResolveStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "explicit: {}, geocoded: {}, missed: {}",
            self.explicit, self.geocoded, self.missed
        )
    }
}

/// Shape of the join, for logging
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JoinStats {
    pub inspection_zips: usize,
    pub population_zips: usize,
    pub joined: usize,
    pub dropped_without_population: usize,
    pub garages: ResolveStats,
    pub dropoffs: ResolveStats,
    pub litter_baskets: ResolveStats,
    pub parks: ResolveStats,
}

impl fmt::Display for JoinStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inspection zips: {}, population zips: {}, joined: {}, dropped: {}",
            self.inspection_zips,
            self.population_zips,
            self.joined,
            self.dropped_without_population
        )
    }
}

/// Write operation statistics
#[derive(Debug, Default, Clone)]
pub struct WriteStats {
    pub rows: usize,
    pub bytes: u64,
}

impl fmt::Display for WriteStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rows: {}, bytes: {}", self.rows, self.bytes)
    }
}
