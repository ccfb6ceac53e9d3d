use std::path::PathBuf;
use std::sync::Arc;

use patrol_batch::prelude::*;
use patrol_batch::runner::RECORDS_FILE;
use time::macros::datetime;
use trajectory::config::SimulationConfig;
use trajectory::errors::SimulationError;
use trajectory::terrain::FlatElevation;

const FEATURES: &str = r#"[
    { "id": "A", "ring": [[0, 0], [100, 0], [100, 100], [0, 100]],
      "fields": { "district": "north" } },
    { "id": "B", "ring": [[200, 0], [280, 0], [280, 90], [200, 90]],
      "person_number": 2, "start_time": "2024-06-02T09:30:00Z",
      "fields": { "district": "north" } },
    { "id": "flat", "ring": [[0, 0], [10, 0], [20, 0]],
      "fields": { "district": "south" } },
    { "ring": [[0, 0], [90, 0], [90, 110], [0, 110]],
      "fields": { "district": "south" } }
]"#;

fn config() -> SimulationConfig {
    SimulationConfig::from_json(
        r#"{ "gps": { "coordinate_system": "local" },
             "persons": [ { "number": 1 }, { "number": 2, "max_speed": 1.4 } ] }"#,
    )
    .unwrap()
}

fn fresh_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(name);
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn options(dir: PathBuf) -> BatchOptions {
    BatchOptions {
        output_dir: dir,
        seed: 42,
        start_time: datetime!(2024-06-01 08:00 UTC),
        person_number: None,
    }
}

fn runner(config: &SimulationConfig) -> BatchRunner<'_> {
    BatchRunner::new(
        config,
        Arc::new(FlatElevation::default()),
        Box::new(KeyedIndexNamer::new(vec!["district".to_string()])),
    )
}

#[test]
fn test_batch_writes_outputs_and_skips_failures() {
    let config = config();
    let features = parse_features(FEATURES).unwrap();
    let dir = fresh_dir("patrol_batch_outputs");

    let report = runner(&config).run(&features, &options(dir.clone())).unwrap();

    let names: Vec<&str> = report.written.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["north_0", "north_1", "south_0"]);
    for written in &report.written {
        assert!(written.gpx.exists());
        assert!(written.summary.exists());
    }

    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        &report.failed[0],
        BatchError::Simulation {
            id,
            source: SimulationError::Geometry(_),
        } if id == "flat"
    ));

    let records: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join(RECORDS_FILE)).unwrap()).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[1]["feature_id"], "B");
    assert_eq!(records[1]["person_number"], 2);
    assert_eq!(records[1]["start_time"], "2024-06-02T09:30:00Z");
    assert_eq!(records[2]["feature_id"], "3");

    let summary = std::fs::read_to_string(dir.join("north_0.txt")).unwrap();
    assert!(summary.starts_with("name=north_0\n"));
    assert!(summary.contains("start_time=2024-06-01T08:00:00Z\n"));

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_batch_is_reproducible() {
    let config = config();
    let features = parse_features(FEATURES).unwrap();
    let first = fresh_dir("patrol_batch_repro_a");
    let second = fresh_dir("patrol_batch_repro_b");

    runner(&config).run(&features, &options(first.clone())).unwrap();
    runner(&config).run(&features, &options(second.clone())).unwrap();

    for name in ["north_0.gpx", "north_1.gpx", "south_0.gpx", RECORDS_FILE] {
        let a = std::fs::read(first.join(name)).unwrap();
        let b = std::fs::read(second.join(name)).unwrap();
        assert_eq!(a, b, "{name} differs between runs");
    }

    std::fs::remove_dir_all(first).ok();
    std::fs::remove_dir_all(second).ok();
}

#[test]
fn test_person_override_applies_to_every_feature() {
    let config = config();
    let features = parse_features(FEATURES).unwrap();
    let dir = fresh_dir("patrol_batch_person");
    let mut opts = options(dir.clone());
    opts.person_number = Some(1);

    let report = runner(&config).run(&features[..2], &opts).unwrap();
    assert_eq!(report.written.len(), 2);

    let records: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(dir.join(RECORDS_FILE)).unwrap()).unwrap();
    assert!(records.iter().all(|r| r["person_number"] == 1));

    std::fs::remove_dir_all(dir).ok();
}
