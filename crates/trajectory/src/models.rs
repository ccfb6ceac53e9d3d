use geo::{Coord, LineString, Polygon};
use serde::Serialize;
use time::OffsetDateTime;

use crate::errors::ElevationError;
use crate::gps::GpsSample;

/// An accepted patrol trajectory.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// At least two samples, timestamps non-decreasing.
    pub samples: Vec<GpsSample>,
    pub person_number: u32,
    pub polygon_id: Option<String>,
    pub start_time: OffsetDateTime,
    /// Coverage ratio the validator accepted.
    pub area_ratio: f64,
    /// 1-based attempt that produced the trajectory.
    pub attempts: u32,
    /// Backtracks taken within the accepted attempt.
    pub backtracks: u32,
    /// Area of the source polygon in square meters.
    pub source_area: f64,
    /// Boundary length of the source polygon in meters.
    pub source_perimeter: f64,
    /// Length of the reported path in meters.
    pub total_distance: f64,
    /// Set when elevation enrichment failed; samples then carry no elevation.
    pub elevation_error: Option<ElevationError>,
}

impl Trajectory {
    pub fn end_time(&self) -> OffsetDateTime {
        self.samples
            .last()
            .map(|s| s.timestamp)
            .unwrap_or(self.start_time)
    }

    pub fn duration(&self) -> time::Duration {
        self.end_time() - self.start_time
    }

    /// Restarts before the accepted attempt.
    pub fn retry_count(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    /// Closed ring through the reported points, in source coordinates.
    pub fn enclosing_polygon(&self) -> Polygon<f64> {
        let ring: Vec<Coord> = self
            .samples
            .iter()
            .map(|s| Coord { x: s.x, y: s.y })
            .collect();
        Polygon::new(LineString::from(ring), vec![])
    }

    pub fn elevation_range(&self) -> Option<(f64, f64)> {
        self.samples
            .iter()
            .filter_map(|s| s.elevation)
            .fold(None, |range, e| match range {
                None => Some((e, e)),
                Some((lo, hi)) => Some((lo.min(e), hi.max(e))),
            })
    }

    pub fn summary(&self, name: &str) -> TrajectorySummary {
        let first = self.samples.first();
        let last = self.samples.last();
        let elevations = self.elevation_range();
        TrajectorySummary {
            name: name.to_string(),
            person_number: self.person_number,
            start_x: first.map_or(0.0, |s| s.x),
            start_y: first.map_or(0.0, |s| s.y),
            start_lon: first.map_or(0.0, |s| s.longitude),
            start_lat: first.map_or(0.0, |s| s.latitude),
            end_x: last.map_or(0.0, |s| s.x),
            end_y: last.map_or(0.0, |s| s.y),
            end_lon: last.map_or(0.0, |s| s.longitude),
            end_lat: last.map_or(0.0, |s| s.latitude),
            min_elevation: elevations.map(|(lo, _)| lo),
            max_elevation: elevations.map(|(_, hi)| hi),
            start_time: self.start_time,
            end_time: self.end_time(),
            total_distance: self.total_distance,
            area: self.source_area,
            perimeter: self.source_perimeter,
            area_ratio: self.area_ratio,
            retry_count: self.retry_count(),
            sample_count: self.samples.len(),
        }
    }
}

/// Flat per-trajectory report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectorySummary {
    pub name: String,
    pub person_number: u32,
    pub start_x: f64,
    pub start_y: f64,
    pub start_lon: f64,
    pub start_lat: f64,
    pub end_x: f64,
    pub end_y: f64,
    pub end_lon: f64,
    pub end_lat: f64,
    pub min_elevation: Option<f64>,
    pub max_elevation: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub total_distance: f64,
    pub area: f64,
    pub perimeter: f64,
    pub area_ratio: f64,
    pub retry_count: u32,
    pub sample_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample(x: f64, y: f64, secs: i64, elevation: Option<f64>) -> GpsSample {
        GpsSample {
            timestamp: datetime!(2024-01-01 00:00 UTC) + time::Duration::seconds(secs),
            x,
            y,
            longitude: x,
            latitude: y,
            elevation,
            accuracy: 3.0,
            signal_strength: 0.9,
            heading: 0.0,
        }
    }

    fn trajectory(samples: Vec<GpsSample>) -> Trajectory {
        Trajectory {
            samples,
            person_number: 3,
            polygon_id: Some("p1".to_string()),
            start_time: datetime!(2024-01-01 00:00 UTC),
            area_ratio: 0.93,
            attempts: 2,
            backtracks: 0,
            source_area: 100.0,
            source_perimeter: 40.0,
            total_distance: 40.0,
            elevation_error: None,
        }
    }

    #[test]
    fn test_summary_fields() {
        let t = trajectory(vec![
            sample(0.0, 0.0, 0, Some(12.0)),
            sample(10.0, 0.0, 10, Some(15.0)),
            sample(10.0, 10.0, 20, Some(9.0)),
        ]);
        let summary = t.summary("p1_0");

        assert_eq!(summary.name, "p1_0");
        assert_eq!(summary.retry_count, 1);
        assert_eq!(summary.perimeter, 40.0);
        assert_eq!((summary.end_x, summary.end_y), (10.0, 10.0));
        assert_eq!(summary.min_elevation, Some(9.0));
        assert_eq!(summary.max_elevation, Some(15.0));
        assert_eq!(summary.end_time, datetime!(2024-01-01 00:00:20 UTC));
        assert_eq!(t.duration(), time::Duration::seconds(20));
    }

    #[test]
    fn test_missing_elevations() {
        let t = trajectory(vec![sample(0.0, 0.0, 0, None), sample(1.0, 1.0, 5, None)]);
        assert_eq!(t.elevation_range(), None);
        assert_eq!(t.summary("x").min_elevation, None);
    }

    #[test]
    fn test_enclosing_polygon_is_closed() {
        let t = trajectory(vec![
            sample(0.0, 0.0, 0, None),
            sample(10.0, 0.0, 10, None),
            sample(10.0, 10.0, 20, None),
        ]);
        let polygon = t.enclosing_polygon();
        assert_eq!(polygon.exterior().0.len(), 4);
        assert!(polygon.exterior().is_closed());
    }
}
