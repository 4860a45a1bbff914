//! Data models for the plant analysis pipeline.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};

// ---

/// One plant as submitted in the request body, after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantRecord {
    // ---
    pub id: String,
    pub info: String,
    pub name: String,
    pub location: String,
    /// Wetness samples in input order. Levels are expected in 0..=20.
    pub wetness: Vec<(NaiveDateTime, i64)>,
    /// Watering events in input order.
    pub water_history: Vec<NaiveDateTime>,
}

/// The full decoded request body, keyed by plant id.
pub type PlantCollection = HashMap<String, PlantRecord>;

/// Inclusive calendar date range. `start > end` is allowed and matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    // ---
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    // ---
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// True when the date component of `ts` lies within the range.
    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        // ---
        let date = ts.date();
        self.start <= date && date <= self.end
    }
}

/// Both series of one plant, restricted to a range and sorted ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredSeries {
    // ---
    pub water_history: Vec<NaiveDateTime>,
    pub wetness: Vec<(NaiveDateTime, i64)>,
}

/// A rendered chart ready to be handed to a publisher.
#[derive(Debug, Clone)]
pub struct ChartArtifact {
    // ---
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub key: String,
}

impl ChartArtifact {
    // ---
    /// Name the artifact after the plant and range, and namespace the storage
    /// key under a random prefix.
    pub fn new(bytes: Vec<u8>, plant_name: &str, range: &DateRange) -> Self {
        // ---
        let file_name = format!(
            "{}_{}_{}.png",
            urlencoding::encode(plant_name),
            range.start.format("%Y-%m-%d"),
            range.end.format("%Y-%m-%d")
        );
        let key = format!("{}/{}", uuid::Uuid::new_v4(), file_name);

        Self {
            bytes,
            file_name,
            key,
        }
    }
}
