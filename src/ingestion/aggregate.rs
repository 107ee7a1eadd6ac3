//! Aggregation functions - collapse each source to one value per ZIP and
//! join them onto the inspection base table

use crate::ingestion::geocode::ReferenceTable;
use crate::ingestion::types::{
    FacilityKind, FacilityRecord, InspectionRecord, JoinStats, PopulationRecord, RegressionInputs,
    RegressionRow, ResolveStats,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// ZIP codes a facility belongs to. Explicit ZIPs win; otherwise the point
/// is geocoded. An empty result means the record counts nowhere.
pub fn resolve_zips(
    record: &FacilityRecord,
    table: &ReferenceTable,
    stats: &mut ResolveStats,
) -> Vec<String> {
    if !record.zip_codes.is_empty() {
        stats.explicit += 1;
        return record.zip_codes.clone();
    }

    let (latitude, longitude) = match record.point {
        Some(point) => (Some(point.latitude), Some(point.longitude)),
        None => (None, None),
    };

    match table.resolve(latitude, longitude) {
        Some(zip) => {
            stats.geocoded += 1;
            vec![zip.to_string()]
        }
        None => {
            debug!("No ZIP code for {} record at {:?}", record.kind, record.point);
            stats.missed += 1;
            Vec::new()
        }
    }
}

/// Count records per ZIP
pub fn count_by_zip<I, S>(zips: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut counts = BTreeMap::new();
    for zip in zips {
        *counts.entry(zip.into()).or_insert(0) += 1;
    }
    counts
}

/// Sum a quantity per ZIP. A record listing several ZIPs adds its full
/// value to each of them.
pub fn sum_by_zip<I>(entries: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = (Vec<String>, f64)>,
{
    let mut sums = BTreeMap::new();
    for (zips, value) in entries {
        for zip in zips {
            *sums.entry(zip).or_insert(0.0) += value;
        }
    }
    sums
}

/// Set of ZIPs where a source has at least one record
pub fn zip_presence<I, S>(zips: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    zips.into_iter().map(Into::into).collect()
}

/// Inspection counts inner-joined with population, ordered by ZIP.
/// Returns the rows plus the number of inspection ZIPs dropped.
pub fn base_table(
    inspections: &[InspectionRecord],
    population: &[PopulationRecord],
) -> (Vec<RegressionRow>, usize) {
    let counts = count_by_zip(inspections.iter().map(|r| r.zip_code.as_str()));

    let mut population_by_zip: HashMap<&str, i64> = HashMap::new();
    for record in population {
        population_by_zip
            .entry(record.zip.as_str())
            .or_insert(record.population);
    }

    let mut dropped = 0;
    let rows = counts
        .into_iter()
        .filter_map(|(zip_code, inspections)| {
            let Some(&population) = population_by_zip.get(zip_code.as_str()) else {
                debug!("Dropping ZIP {} - no population match", zip_code);
                dropped += 1;
                return None;
            };
            Some(RegressionRow {
                zip_code,
                inspections,
                population,
                has_garage: 0,
                has_dropoff: 0,
                litter_basket_count: 0,
                total_park_acres: 0.0,
            })
        })
        .collect();

    (rows, dropped)
}

fn resolve_all(
    records: &[FacilityRecord],
    table: &ReferenceTable,
) -> (Vec<Vec<String>>, ResolveStats) {
    let mut stats = ResolveStats::default();
    let zips = records
        .iter()
        .map(|record| resolve_zips(record, table, &mut stats))
        .collect();
    (zips, stats)
}

fn log_misses(kind: FacilityKind, stats: &ResolveStats) {
    if stats.missed > 0 {
        warn!("{}: {} records could not be placed in a ZIP code", kind, stats.missed);
    }
    info!("{} resolved ({})", kind, stats);
}

/// Build the regression dataset from parsed inputs
pub fn build_regression_rows(
    inputs: &RegressionInputs,
    table: &ReferenceTable,
) -> (Vec<RegressionRow>, JoinStats) {
    info!(
        "Joining {} inspections onto {} population rows",
        inputs.inspections.len(),
        inputs.population.len()
    );

    let (mut rows, dropped) = base_table(&inputs.inspections, &inputs.population);

    let (garage_zips, garages) = resolve_all(&inputs.garages, table);
    let (dropoff_zips, dropoffs) = resolve_all(&inputs.dropoffs, table);
    let (litter_zips, litter_baskets) = resolve_all(&inputs.litter_baskets, table);

    // Parks need acreage too, so only records with both ZIPs and acres count
    let mut parks = ResolveStats::default();
    let park_entries: Vec<(Vec<String>, f64)> = inputs
        .parks
        .iter()
        .filter_map(|park| {
            let acres = park.acres?;
            let zips = resolve_zips(park, table, &mut parks);
            (!zips.is_empty()).then_some((zips, acres))
        })
        .collect();

    log_misses(FacilityKind::Garage, &garages);
    log_misses(FacilityKind::Dropoff, &dropoffs);
    log_misses(FacilityKind::LitterBasket, &litter_baskets);
    log_misses(FacilityKind::Park, &parks);

    let with_garage = zip_presence(garage_zips.into_iter().flatten());
    let with_dropoff = zip_presence(dropoff_zips.into_iter().flatten());
    let litter_counts = count_by_zip(litter_zips.into_iter().flatten());
    let park_acres = sum_by_zip(park_entries);

    for row in &mut rows {
        row.has_garage = u8::from(with_garage.contains(&row.zip_code));
        row.has_dropoff = u8::from(with_dropoff.contains(&row.zip_code));
        row.litter_basket_count = litter_counts.get(&row.zip_code).copied().unwrap_or(0);
        row.total_park_acres = park_acres.get(&row.zip_code).copied().unwrap_or(0.0);
    }

    let stats = JoinStats {
        inspection_zips: rows.len() + dropped,
        population_zips: inputs.population.len(),
        joined: rows.len(),
        dropped_without_population: dropped,
        garages,
        dropoffs,
        litter_baskets,
        parks,
    };

    info!("Join complete: {}", stats);
    (rows, stats)
}
