//! Trajectory outputs: GPX tracks, text summaries and the feature records
//! file.

use std::fmt::Write as _;
use std::path::Path;

use geo::Point;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use trajectory::models::{Trajectory, TrajectorySummary};

use crate::errors::BatchError;

/// One row of `trajectories.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub name: String,
    pub feature_id: String,
    pub person_number: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub total_distance: f64,
    pub area: f64,
    /// Elevation of the first sample.
    pub elevation: Option<f64>,
}

impl FeatureRecord {
    pub fn new(name: &str, feature_id: &str, trajectory: &Trajectory) -> Self {
        Self {
            name: name.to_string(),
            feature_id: feature_id.to_string(),
            person_number: trajectory.person_number,
            start_time: trajectory.start_time,
            end_time: trajectory.end_time(),
            total_distance: trajectory.total_distance,
            area: trajectory.source_area,
            elevation: trajectory.samples.first().and_then(|s| s.elevation),
        }
    }
}

/// Builds a GPX 1.1 document with one track of the trajectory's samples.
pub fn to_gpx(name: &str, trajectory: &Trajectory) -> Gpx {
    let waypoints: Vec<Waypoint> = trajectory
        .samples
        .iter()
        .map(|s| {
            let mut wp = Waypoint::new(Point::new(s.longitude, s.latitude));
            wp.elevation = s.elevation;
            wp.time = Some(gpx::Time::from(s.timestamp));
            wp
        })
        .collect();

    let mut track = Track::new();
    track.name = Some(name.to_string());
    track.description = Some(format!(
        "person {}, area ratio {:.4}, attempts {}",
        trajectory.person_number, trajectory.area_ratio, trajectory.attempts
    ));
    track.segments = vec![TrackSegment { points: waypoints }];

    Gpx {
        version: GpxVersion::Gpx11,
        creator: Some("patrol-sim".to_string()),
        tracks: vec![track],
        ..Default::default()
    }
}

pub fn write_gpx(path: impl AsRef<Path>, name: &str, trajectory: &Trajectory) -> Result<(), BatchError> {
    let file = std::fs::File::create(path)?;
    gpx::write(&to_gpx(name, trajectory), file).map_err(|e| BatchError::Gpx(e.to_string()))?;
    Ok(())
}

/// Renders a summary as `key=value` lines.
pub fn summary_text(summary: &TrajectorySummary) -> String {
    let time = |t: OffsetDateTime| t.format(&Rfc3339).unwrap_or_default();
    let elevation = |e: Option<f64>| e.map(|v| v.to_string()).unwrap_or_default();

    let mut out = String::new();
    let _ = writeln!(out, "name={}", summary.name);
    let _ = writeln!(out, "person_number={}", summary.person_number);
    let _ = writeln!(out, "start_x={}", summary.start_x);
    let _ = writeln!(out, "start_y={}", summary.start_y);
    let _ = writeln!(out, "start_lon={:.7}", summary.start_lon);
    let _ = writeln!(out, "start_lat={:.7}", summary.start_lat);
    let _ = writeln!(out, "end_x={}", summary.end_x);
    let _ = writeln!(out, "end_y={}", summary.end_y);
    let _ = writeln!(out, "end_lon={:.7}", summary.end_lon);
    let _ = writeln!(out, "end_lat={:.7}", summary.end_lat);
    let _ = writeln!(out, "min_elevation={}", elevation(summary.min_elevation));
    let _ = writeln!(out, "max_elevation={}", elevation(summary.max_elevation));
    let _ = writeln!(out, "start_time={}", time(summary.start_time));
    let _ = writeln!(out, "end_time={}", time(summary.end_time));
    let _ = writeln!(out, "total_distance={:.2}", summary.total_distance);
    let _ = writeln!(out, "area={:.2}", summary.area);
    let _ = writeln!(out, "perimeter={:.2}", summary.perimeter);
    let _ = writeln!(out, "area_ratio={:.4}", summary.area_ratio);
    let _ = writeln!(out, "retry_count={}", summary.retry_count);
    let _ = writeln!(out, "sample_count={}", summary.sample_count);
    out
}

pub fn write_summary(path: impl AsRef<Path>, summary: &TrajectorySummary) -> Result<(), BatchError> {
    std::fs::write(path, summary_text(summary))?;
    Ok(())
}

pub fn write_records(path: impl AsRef<Path>, records: &[FeatureRecord]) -> Result<(), BatchError> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), records)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use trajectory::gps::GpsSample;

    fn trajectory() -> Trajectory {
        let sample = |x: f64, secs: i64, elevation| GpsSample {
            timestamp: datetime!(2024-06-01 08:00 UTC) + time::Duration::seconds(secs),
            x,
            y: 0.0,
            longitude: 120.0 + x / 100_000.0,
            latitude: 30.0,
            elevation,
            accuracy: 3.0,
            signal_strength: 0.9,
            heading: 0.0,
        };
        Trajectory {
            samples: vec![sample(0.0, 0, Some(21.0)), sample(5.0, 4, Some(23.0)), sample(10.0, 8, None)],
            person_number: 2,
            polygon_id: Some("A".to_string()),
            start_time: datetime!(2024-06-01 08:00 UTC),
            area_ratio: 0.95,
            attempts: 3,
            backtracks: 1,
            source_area: 10_000.0,
            source_perimeter: 400.0,
            total_distance: 10.0,
            elevation_error: None,
        }
    }

    #[test]
    fn test_gpx_round_trip() {
        let path = std::env::temp_dir().join("patrol_batch_export_test.gpx");
        write_gpx(&path, "north_0", &trajectory()).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let gpx = gpx::read(std::io::BufReader::new(file)).unwrap();
        assert_eq!(gpx.tracks.len(), 1);
        assert_eq!(gpx.tracks[0].name.as_deref(), Some("north_0"));
        let points = &gpx.tracks[0].segments[0].points;
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].elevation, Some(21.0));
        assert!((points[2].point().x() - 120.0001).abs() < 1e-9);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_summary_text() {
        let text = summary_text(&trajectory().summary("north_0"));
        assert!(text.starts_with("name=north_0\n"));
        assert!(text.contains("retry_count=2\n"));
        assert!(text.contains("min_elevation=21\n"));
        assert!(text.contains("max_elevation=23\n"));
        assert!(text.contains("end_time=2024-06-01T08:00:08Z\n"));
        assert!(text.contains("area_ratio=0.9500\n"));
        assert!(text.contains("perimeter=400.00\n"));
    }

    #[test]
    fn test_feature_record() {
        let record = FeatureRecord::new("north_0", "A", &trajectory());
        assert_eq!(record.elevation, Some(21.0));
        assert_eq!(record.end_time, datetime!(2024-06-01 08:00:08 UTC));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["start_time"], "2024-06-01T08:00:00Z");
        assert_eq!(json["person_number"], 2);
    }
}
