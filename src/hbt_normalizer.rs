// Snapshot normalization: raw decoded feed JSON -> validated vehicle records
//
// The feed is untrusted. Only a missing or non-array top-level `entity` list
// fails the cycle; any single entry that cannot be turned into a record is
// dropped and counted.

use crate::hbt_destinations::DestinationTable;
use crate::hbt_models::{HBTError, Position, Result, VehicleRecord};
use serde_json::Value;
use std::collections::HashMap;

/// Route id given to vehicles whose trip carries none.
pub const UNKNOWN_ROUTE: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSnapshot {
    /// Feed order, ids unique.
    pub records: Vec<VehicleRecord>,
    pub dropped: usize,
    /// Feed header timestamp (seconds since epoch), when present.
    pub timestamp: Option<i64>,
}

pub struct SnapshotNormalizer {
    destinations: DestinationTable,
}

impl SnapshotNormalizer {
    pub fn new(destinations: DestinationTable) -> Self {
        SnapshotNormalizer { destinations }
    }

    pub fn normalize(&self, raw: &Value) -> Result<NormalizedSnapshot> {
        if !raw.is_object() {
            return Err(HBTError::MalformedFeed(
                "snapshot is not a JSON object".to_string(),
            ));
        }

        let entities = match raw.get("entity") {
            Some(Value::Array(entities)) => entities,
            Some(other) => {
                return Err(HBTError::MalformedFeed(format!(
                    "entity list is not an array (found {})",
                    json_kind(other)
                )));
            }
            None => {
                return Err(HBTError::MalformedFeed(
                    "missing top-level entity list".to_string(),
                ));
            }
        };

        let mut records: Vec<VehicleRecord> = Vec::with_capacity(entities.len());
        let mut index_by_id: HashMap<String, usize> = HashMap::with_capacity(entities.len());
        let mut dropped = 0;

        for (i, entry) in entities.iter().enumerate() {
            let Some(record) = self.normalize_entry(entry) else {
                log::trace!("Dropping invalid feed entry at index {}", i);
                dropped += 1;
                continue;
            };

            // Last write wins; the slot keeps its first position.
            match index_by_id.get(&record.id) {
                Some(&slot) => {
                    log::debug!("Duplicate vehicle id {} in snapshot, keeping latest", record.id);
                    records[slot] = record;
                }
                None => {
                    index_by_id.insert(record.id.clone(), records.len());
                    records.push(record);
                }
            }
        }

        if dropped > 0 {
            log::debug!("Dropped {} of {} feed entries", dropped, entities.len());
        }

        Ok(NormalizedSnapshot {
            records,
            dropped,
            timestamp: raw.get("header").and_then(|h| h.get("timestamp")).and_then(as_i64),
        })
    }

    fn normalize_entry(&self, entry: &Value) -> Option<VehicleRecord> {
        let vehicle = entry.get("vehicle").filter(|v| v.is_object())?;

        let id = entry
            .get("id")
            .and_then(as_id)
            .or_else(|| vehicle.get("vehicle").and_then(|d| d.get("id")).and_then(as_id))?;

        let position = vehicle.get("position")?;
        let position = Position::new(
            position.get("latitude").and_then(as_f64)?,
            position.get("longitude").and_then(as_f64)?,
        );
        if !position.is_finite() {
            return None;
        }

        let bearing = vehicle
            .get("position")
            .and_then(|p| p.get("bearing"))
            .and_then(as_f64)
            .filter(|b| b.is_finite());

        let trip = vehicle.get("trip");
        let route_id = trip
            .and_then(|t| field(t, "routeId", "route_id"))
            .and_then(as_id)
            .unwrap_or_else(|| UNKNOWN_ROUTE.to_string());

        let direction_id = trip
            .and_then(|t| field(t, "directionId", "direction_id"))
            .and_then(as_i64)
            .filter(|d| *d == 0 || *d == 1)
            .unwrap_or(0) as u32;

        let label = self.destinations.label(&route_id, direction_id);

        Some(VehicleRecord {
            id,
            route_id,
            direction_id,
            position,
            bearing,
            label,
        })
    }
}

// ============================================================================
// JSON Helpers
// ============================================================================

fn field<'a>(obj: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    obj.get(camel).or_else(|| obj.get(snake))
}

/// Strings are taken trimmed; numbers are stringified.
fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// int64 fields arrive as strings from protobuf JSON encoders. Values past
/// `i64::MAX` are rejected rather than wrapped.
fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
