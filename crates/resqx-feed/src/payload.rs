//! Validation of pushed snapshots.
//!
//! A snapshot is an object with two arrays, one per professional category.
//! Each element goes through [`validate_record`]; rejects are counted in
//! [`HiddenCounts`] and never abort the batch. A payload without both arrays
//! fails as a whole with [`PayloadError`].

use std::collections::HashMap;

use resqx_core::{parse_coordinate, Coordinates, ProfessionalRecord, ProfessionalType};
use serde_json::{Map, Value};

use crate::error::PayloadError;
use crate::status::HiddenCounts;

/// Array holding tow-truck professionals.
pub const TOW_TRUCKS_FIELD: &str = "professionals";
/// Array holding first responders.
pub const FIRST_RESPONDERS_FIELD: &str = "firstResponders";

/// Fields consumed into typed [`ProfessionalRecord`] members; everything else
/// lands in `details`.
const CONSUMED_FIELDS: &[&str] = &[
    "id",
    "_id",
    "name",
    "professionalType",
    "isOnline",
    "latitude",
    "longitude",
];

/// A validated snapshot.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Admitted records, unique by id, in first-seen order.
    pub records: Vec<ProfessionalRecord>,
    pub hidden: HiddenCounts,
}

/// Why a single raw record was kept out of the published set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordRejection {
    InvalidCoordinates,
    /// Not an object, or no usable id.
    Malformed,
    UnrecognizedCategory(String),
}

/// Validates a whole pushed payload.
///
/// Duplicate ids resolve last-write-wins; the surviving record keeps the
/// position of the first occurrence.
///
/// # Errors
///
/// - [`PayloadError::NotAnObject`] if the payload is not a JSON object.
/// - [`PayloadError::MissingArray`] if either category array is absent or
///   not an array.
pub fn parse_snapshot(payload: &Value) -> Result<Batch, PayloadError> {
    let object = payload.as_object().ok_or(PayloadError::NotAnObject)?;
    let tow_trucks = category_array(object, TOW_TRUCKS_FIELD)?;
    let first_responders = category_array(object, FIRST_RESPONDERS_FIELD)?;

    let mut batch = Batch::default();
    let mut positions: HashMap<String, usize> = HashMap::new();

    let sources = [
        (tow_trucks, ProfessionalType::TowTruck),
        (first_responders, ProfessionalType::FirstResponder),
    ];
    for (items, fallback) in sources {
        for raw in items {
            match validate_record(raw, &fallback) {
                Ok(record) => {
                    if let Some(&idx) = positions.get(&record.id) {
                        tracing::debug!(
                            id = %record.id,
                            "duplicate id in snapshot, last write wins"
                        );
                        batch.records[idx] = record;
                    } else {
                        positions.insert(record.id.clone(), batch.records.len());
                        batch.records.push(record);
                    }
                }
                Err(RecordRejection::InvalidCoordinates) => {
                    tracing::debug!(
                        id = ?raw_id(raw),
                        "dropping record without finite coordinates"
                    );
                    batch.hidden.invalid_coordinates += 1;
                }
                Err(RecordRejection::Malformed) => {
                    tracing::debug!("dropping record without a usable id");
                    batch.hidden.malformed += 1;
                }
                Err(RecordRejection::UnrecognizedCategory(tag)) => {
                    tracing::warn!(
                        id = ?raw_id(raw),
                        category = %tag,
                        "excluding record with unrecognized category"
                    );
                    batch.hidden.unrecognized_category += 1;
                }
            }
        }
    }

    Ok(batch)
}

/// Validates one raw record.
///
/// Checks run in order: coordinates, category, id. A missing or `null`
/// `professionalType` falls back to `fallback`, the category of the array the
/// record came from.
///
/// # Errors
///
/// Returns the first [`RecordRejection`] that applies.
pub fn validate_record(
    raw: &Value,
    fallback: &ProfessionalType,
) -> Result<ProfessionalRecord, RecordRejection> {
    let object = raw.as_object().ok_or(RecordRejection::Malformed)?;

    let latitude = object.get("latitude").and_then(parse_coordinate);
    let longitude = object.get("longitude").and_then(parse_coordinate);
    let coordinates = latitude
        .zip(longitude)
        .and_then(|(lat, lng)| Coordinates::new(lat, lng))
        .ok_or(RecordRejection::InvalidCoordinates)?;

    let professional_type = match object.get("professionalType") {
        None | Some(Value::Null) => fallback.clone(),
        Some(Value::String(tag)) => ProfessionalType::from_tag(tag),
        Some(other) => ProfessionalType::Unrecognized(other.to_string()),
    };
    if let ProfessionalType::Unrecognized(tag) = &professional_type {
        return Err(RecordRejection::UnrecognizedCategory(tag.clone()));
    }

    let id = raw_id(raw).ok_or(RecordRejection::Malformed)?;

    let details: Map<String, Value> = object
        .iter()
        .filter(|(k, _)| !CONSUMED_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(ProfessionalRecord {
        id,
        name: display_name(object),
        professional_type,
        is_online: object
            .get("isOnline")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        coordinates,
        details,
    })
}

fn category_array<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Vec<Value>, PayloadError> {
    object
        .get(field)
        .and_then(Value::as_array)
        .ok_or(PayloadError::MissingArray(field))
}

/// Reads `id` (or `_id`) as a non-empty string; numeric ids are stringified.
fn raw_id(raw: &Value) -> Option<String> {
    let object = raw.as_object()?;
    ["id", "_id"].iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn display_name(object: &Map<String, Value>) -> String {
    if let Some(name) = object
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return name.to_owned();
    }
    ["firstName", "lastName"]
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[path = "payload_test.rs"]
mod tests;
