//! Tracked vehicles and the snapshots that hold them.
//!
//! Raw feed records are loosely typed: every field may be missing, numbers may
//! arrive as strings (with a comma decimal separator) and timestamps may be
//! ISO-8601 text or epoch milliseconds. [`Entity::from_raw`] normalizes all of
//! that into one strongly typed shape with defined fallbacks.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Placeholder shown in tabular listings for absent values.
pub const PLACEHOLDER: &str = "N/A";

// ============================================================================
// RAW RECORD (Wire)
// ============================================================================

/// One vehicle report exactly as it appears on the wire.
///
/// Field names follow the upstream GPS feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Vehicle identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordem: Option<Value>,

    /// Line label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linha: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<Value>,

    /// Scalar speed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocidade: Option<Value>,

    /// Server receive time of the report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datahoraservidor: Option<Value>,
}

// ============================================================================
// POSITION
// ============================================================================

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    /// Creates a position, rejecting non-finite or out-of-range coordinates.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }

    /// The position as a `geo` coordinate (x = longitude, y = latitude).
    pub fn to_coord(self) -> geo::Coord<f64> {
        geo::Coord { x: self.lon, y: self.lat }
    }

    pub fn from_coord(coord: geo::Coord<f64>) -> Self {
        Self { lat: coord.y, lon: coord.x }
    }
}

// ============================================================================
// ENTITY
// ============================================================================

/// A tracked vehicle, normalized from a [`RawRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identifier; `None` marks a malformed record
    pub id: Option<String>,

    /// Line label
    pub line: Option<String>,

    /// `None` when latitude or longitude is absent or invalid
    pub position: Option<Position>,

    /// Speed, 0 when absent
    pub speed: f64,

    /// Last-seen time; `None` means "unknown"
    pub last_seen: Option<NaiveDateTime>,
}

impl Entity {
    /// Normalizes a raw wire record.
    pub fn from_raw(raw: &RawRecord) -> Self {
        let lat = raw.latitude.as_ref().and_then(value_to_f64);
        let lon = raw.longitude.as_ref().and_then(value_to_f64);

        Self {
            id: raw.ordem.as_ref().and_then(value_to_label),
            line: raw.linha.as_ref().and_then(value_to_label),
            position: match (lat, lon) {
                (Some(lat), Some(lon)) => Position::new(lat, lon),
                _ => None,
            },
            speed: raw.velocidade.as_ref().and_then(value_to_f64).unwrap_or(0.0),
            last_seen: raw.datahoraservidor.as_ref().and_then(value_to_timestamp),
        }
    }

    /// True when the entity can take part in spatial operations.
    pub fn is_positioned(&self) -> bool {
        self.position.is_some()
    }

    /// True when the entity may be placed in the cluster tree.
    ///
    /// Records without an identifier are listed but never mapped.
    pub fn is_mappable(&self) -> bool {
        self.id.is_some() && self.position.is_some()
    }

    pub fn id_or_placeholder(&self) -> &str {
        self.id.as_deref().unwrap_or(PLACEHOLDER)
    }

    pub fn line_or_placeholder(&self) -> &str {
        self.line.as_deref().unwrap_or(PLACEHOLDER)
    }

    /// Display row for the tabular listing, with placeholders for gaps.
    pub fn table_row(&self) -> EntityRow {
        EntityRow {
            id: self.id_or_placeholder().to_string(),
            line: self.line_or_placeholder().to_string(),
            latitude: self
                .position
                .map_or_else(|| PLACEHOLDER.to_string(), |p| format!("{:.6}", p.lat)),
            longitude: self
                .position
                .map_or_else(|| PLACEHOLDER.to_string(), |p| format!("{:.6}", p.lon)),
            speed: format!("{}", self.speed),
            last_seen: self.last_seen.map_or_else(
                || PLACEHOLDER.to_string(),
                |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
        }
    }
}

/// One formatted row of the tabular listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRow {
    pub id: String,
    pub line: String,
    pub latitude: String,
    pub longitude: String,
    pub speed: String,
    pub last_seen: String,
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// One complete, internally consistent set of entities.
///
/// Entities sharing an identifier are collapsed last-write-wins: the later
/// report replaces the earlier one in the slot the identifier first occupied.
/// Records without an identifier are never collapsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    generation: u64,
    entities: Vec<Entity>,
    duplicates_merged: usize,
}

impl Snapshot {
    /// The empty snapshot shown before any data arrives.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a snapshot, deduplicating by identifier.
    pub fn from_entities(generation: u64, entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut out: Vec<Entity> = Vec::new();
        let mut duplicates_merged = 0;

        for entity in entities {
            match entity.id.as_ref().and_then(|id| slots.get(id).copied()) {
                Some(slot) => {
                    out[slot] = entity;
                    duplicates_merged += 1;
                }
                None => {
                    if let Some(id) = &entity.id {
                        slots.insert(id.clone(), out.len());
                    }
                    out.push(entity);
                }
            }
        }

        Self {
            generation,
            entities: out,
            duplicates_merged,
        }
    }

    /// Builds a snapshot straight from wire records.
    pub fn from_records(generation: u64, records: &[RawRecord]) -> Self {
        Self::from_entities(generation, records.iter().map(Entity::from_raw))
    }

    /// Monotonic counter of snapshot replacements (0 = initial empty).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of reports dropped because a later one shared their identifier.
    pub fn duplicates_merged(&self) -> usize {
        self.duplicates_merged
    }

    pub fn positioned_count(&self) -> usize {
        self.entities.iter().filter(|e| e.is_positioned()).count()
    }
}

// ============================================================================
// FIELD NORMALIZATION
// ============================================================================

fn value_to_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn value_to_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Number(n) => n.as_i64().and_then(millis_to_naive),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn millis_to_naive(ms: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|t| t.naive_utc())
}

fn parse_timestamp_str(s: &str) -> Option<NaiveDateTime> {
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<i64>().ok().and_then(millis_to_naive);
    }
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(s) {
        return Some(with_offset.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_full_record_normalizes() {
        let entity = Entity::from_raw(&raw(json!({
            "ordem": "A12345",
            "linha": "101",
            "latitude": -22.9068,
            "longitude": -43.1729,
            "velocidade": 35,
            "datahoraservidor": "2024-03-01T10:15:30"
        })));

        assert_eq!(entity.id.as_deref(), Some("A12345"));
        assert_eq!(entity.line.as_deref(), Some("101"));
        let pos = entity.position.unwrap();
        assert_eq!(pos.lat, -22.9068);
        assert_eq!(pos.lon, -43.1729);
        assert_eq!(entity.speed, 35.0);
        assert_eq!(
            entity.last_seen.unwrap().format("%H:%M:%S").to_string(),
            "10:15:30"
        );
    }

    #[test]
    fn test_comma_decimal_strings_are_accepted() {
        let entity = Entity::from_raw(&raw(json!({
            "ordem": "B1",
            "latitude": "-22,87",
            "longitude": "-43,25",
            "velocidade": "12"
        })));

        let pos = entity.position.unwrap();
        assert!((pos.lat + 22.87).abs() < 1e-9);
        assert!((pos.lon + 43.25).abs() < 1e-9);
        assert_eq!(entity.speed, 12.0);
    }

    #[test]
    fn test_missing_fields_fall_back() {
        let entity = Entity::from_raw(&raw(json!({ "ordem": "C1", "longitude": -43.0 })));

        assert!(entity.position.is_none(), "latitude missing => unpositioned");
        assert!(entity.line.is_none());
        assert_eq!(entity.speed, 0.0);
        assert!(entity.last_seen.is_none());
        assert!(!entity.is_mappable());
    }

    #[test]
    fn test_out_of_range_coordinates_are_unpositioned() {
        let entity = Entity::from_raw(&raw(json!({
            "ordem": "D1", "latitude": 123.0, "longitude": 10.0
        })));
        assert!(entity.position.is_none());
    }

    #[test]
    fn test_epoch_millis_timestamp() {
        let entity = Entity::from_raw(&raw(json!({
            "ordem": "E1", "datahoraservidor": 1_700_000_000_000i64
        })));
        let expected = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000)
            .unwrap()
            .naive_utc();
        assert_eq!(entity.last_seen, Some(expected));
    }

    #[test]
    fn test_rfc3339_timestamp_is_converted_to_utc() {
        let entity = Entity::from_raw(&raw(json!({
            "ordem": "E2", "datahoraservidor": "2024-03-01T10:00:00-03:00"
        })));
        assert_eq!(
            entity.last_seen.unwrap().format("%H:%M").to_string(),
            "13:00"
        );
    }

    #[test]
    fn test_missing_identifier_row_uses_placeholders() {
        let entity = Entity::from_raw(&raw(json!({ "linha": 232 })));
        let row = entity.table_row();

        assert_eq!(row.id, PLACEHOLDER);
        assert_eq!(row.line, "232");
        assert_eq!(row.latitude, PLACEHOLDER);
        assert_eq!(row.last_seen, PLACEHOLDER);
        assert_eq!(row.speed, "0");
    }

    #[test]
    fn test_snapshot_last_write_wins_keeps_first_slot() {
        let records = vec![
            raw(json!({ "ordem": "A", "velocidade": 1 })),
            raw(json!({ "ordem": "B", "velocidade": 2 })),
            raw(json!({ "ordem": "A", "velocidade": 3 })),
        ];
        let snapshot = Snapshot::from_records(1, &records);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.duplicates_merged(), 1);
        assert_eq!(snapshot.entities()[0].id.as_deref(), Some("A"));
        assert_eq!(snapshot.entities()[0].speed, 3.0);
        assert_eq!(snapshot.entities()[1].id.as_deref(), Some("B"));
    }

    #[test]
    fn test_snapshot_keeps_every_unidentified_record() {
        let records = vec![raw(json!({ "linha": "1" })), raw(json!({ "linha": "1" }))];
        let snapshot = Snapshot::from_records(1, &records);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.duplicates_merged(), 0);
    }
}
