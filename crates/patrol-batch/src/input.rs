//! Feature input: polygons to patrol, one JSON array per batch.
//!
//! ```json
//! [
//!   { "id": "A-01", "ring": [[0, 0], [100, 0], [100, 100], [0, 100]],
//!     "person_number": 2, "start_time": "2024-06-01T08:00:00Z",
//!     "fields": { "district": "north", "shift": 1 } }
//! ]
//! ```

use std::path::Path;

use geo::{Coord, LineString, Polygon};
use serde::Deserialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::errors::BatchError;

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureInput {
    #[serde(default)]
    pub id: Option<String>,
    /// Exterior ring in the configured coordinate system.
    pub ring: Vec<[f64; 2]>,
    #[serde(default)]
    pub person_number: Option<u32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    /// Attribute values available to the naming strategy.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl FeatureInput {
    /// The explicit id, or the 0-based position in the input.
    pub fn id_or(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| index.to_string())
    }

    pub fn polygon(&self) -> Polygon<f64> {
        let ring: Vec<Coord> = self.ring.iter().map(|&[x, y]| Coord { x, y }).collect();
        Polygon::new(LineString::from(ring), vec![])
    }

    /// Field value rendered as plain text: strings unquoted, null as empty.
    pub fn field_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|value| match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }
}

pub fn load_features(path: impl AsRef<Path>) -> Result<Vec<FeatureInput>, BatchError> {
    let text = std::fs::read_to_string(path)?;
    parse_features(&text)
}

pub fn parse_features(text: &str) -> Result<Vec<FeatureInput>, BatchError> {
    let features: Vec<FeatureInput> = serde_json::from_str(text)?;
    for (index, feature) in features.iter().enumerate() {
        if feature.ring.len() < 3 {
            return Err(BatchError::InvalidFeature {
                id: feature.id_or(index),
                reason: format!("ring has {} points, at least 3 are required", feature.ring.len()),
            });
        }
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;
    use time::macros::datetime;

    #[test]
    fn test_parse_features() {
        let features = parse_features(
            r#"[
                { "id": "A", "ring": [[0, 0], [10, 0], [10, 10], [0, 10]],
                  "start_time": "2024-06-01T08:00:00Z",
                  "fields": { "district": "north", "shift": 2, "note": null } },
                { "ring": [[0, 0], [5, 0], [0, 5]], "person_number": 3 }
            ]"#,
        )
        .unwrap();

        assert_eq!(features.len(), 2);
        assert_eq!(features[0].start_time, Some(datetime!(2024-06-01 08:00 UTC)));
        assert_eq!(features[0].field_text("district").as_deref(), Some("north"));
        assert_eq!(features[0].field_text("shift").as_deref(), Some("2"));
        assert_eq!(features[0].field_text("note").as_deref(), Some(""));
        assert_eq!(features[0].field_text("missing"), None);
        assert!((features[0].polygon().unsigned_area() - 100.0).abs() < 1e-9);

        assert_eq!(features[1].id_or(1), "1");
        assert_eq!(features[1].person_number, Some(3));
        assert!(features[1].start_time.is_none());
    }

    #[test]
    fn test_rejects_short_ring() {
        let err = parse_features(r#"[{ "id": "x", "ring": [[0, 0], [1, 1]] }]"#).unwrap_err();
        assert!(matches!(err, BatchError::InvalidFeature { ref id, .. } if id == "x"));
    }
}
