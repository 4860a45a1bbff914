//! Date-range filtering of one plant's series.

use crate::error::AnalysisError;
use crate::models::{DateRange, FilteredSeries, PlantCollection, PlantRecord};

// ---

/// Look up `plant_id` and filter both of its series to `range`.
pub fn filter_plant<'a>(
    plants: &'a PlantCollection,
    plant_id: &str,
    range: &DateRange,
) -> Result<(&'a PlantRecord, FilteredSeries), AnalysisError> {
    // ---
    let plant = plants
        .get(plant_id)
        .ok_or_else(|| AnalysisError::NotFound(plant_id.to_string()))?;

    Ok((plant, filter_series(plant, range)))
}

/// Keep entries whose date lies in `range`, sorted ascending.
///
/// Sorting is stable, so entries sharing a timestamp keep their input order.
pub fn filter_series(plant: &PlantRecord, range: &DateRange) -> FilteredSeries {
    // ---
    let mut water_history: Vec<_> = plant
        .water_history
        .iter()
        .filter(|ts| range.contains(ts))
        .copied()
        .collect();
    water_history.sort();

    let mut wetness: Vec<_> = plant
        .wetness
        .iter()
        .filter(|(ts, _)| range.contains(ts))
        .copied()
        .collect();
    wetness.sort_by_key(|(ts, _)| *ts);

    FilteredSeries {
        water_history,
        wetness,
    }
}
