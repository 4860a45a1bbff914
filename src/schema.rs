//! Validation of the request body into a [`PlantCollection`].
//!
//! Validation is fail-closed: one bad plant, field or timestamp rejects the
//! whole body.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::models::{PlantCollection, PlantRecord};

// ---

/// Naive layouts tried after RFC 3339. `%.f` also matches no fraction.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Offset-carrying layouts not covered by strict RFC 3339.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];

#[derive(Debug, Deserialize)]
struct RawPlant {
    id: String,
    info: String,
    name: String,
    location: String,
    wetness: Map<String, Value>,
    water_history: Vec<String>,
}

/// Parse an untrusted JSON value into a plant collection.
pub fn validate(body: &Value) -> Result<PlantCollection, SchemaError> {
    // ---
    let plants = body.as_object().ok_or(SchemaError::NotAnObject)?;

    plants
        .iter()
        .map(|(key, value)| {
            let record = validate_plant(key, value)?;
            Ok::<_, SchemaError>((key.clone(), record))
        })
        .collect()
}

fn validate_plant(key: &str, value: &Value) -> Result<PlantRecord, SchemaError> {
    // ---
    let raw = RawPlant::deserialize(value).map_err(|source| SchemaError::Plant {
        plant: key.to_string(),
        source,
    })?;

    // Keys that spell the same instant collapse into one sample; the entry
    // keeps its first position and takes the last value.
    let mut wetness: Vec<(NaiveDateTime, i64)> = Vec::with_capacity(raw.wetness.len());
    let mut seen: HashMap<NaiveDateTime, usize> = HashMap::new();
    for (ts, level) in &raw.wetness {
        let parsed = parse_timestamp(ts).ok_or_else(|| SchemaError::Timestamp {
            plant: key.to_string(),
            value: ts.clone(),
        })?;
        let level = parse_level(level).ok_or_else(|| SchemaError::Level {
            plant: key.to_string(),
            timestamp: ts.clone(),
        })?;

        match seen.get(&parsed) {
            Some(&i) => wetness[i].1 = level,
            None => {
                seen.insert(parsed, wetness.len());
                wetness.push((parsed, level));
            }
        }
    }

    let water_history = raw
        .water_history
        .iter()
        .map(|ts| {
            parse_timestamp(ts).ok_or_else(|| SchemaError::Timestamp {
                plant: key.to_string(),
                value: ts.clone(),
            })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;

    Ok(PlantRecord {
        id: raw.id,
        info: raw.info,
        name: raw.name,
        location: raw.location,
        wetness,
        water_history,
    })
}

/// Permissive timestamp parsing.
///
/// Offset-carrying values keep their wall-clock time, so the date used for
/// range filtering is the date as written.
pub fn parse_timestamp(input: &str) -> Option<NaiveDateTime> {
    // ---
    let s = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_local());
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Integers, floats with no fractional part, or strings holding an integer.
fn parse_level(value: &Value) -> Option<i64> {
    // ---
    if let Some(level) = value.as_i64() {
        return Some(level);
    }
    if let Some(s) = value.as_str() {
        return s.trim().parse().ok();
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}
