//! Batch execution.
//!
//! Features are simulated in parallel, each with its own `ChaCha8Rng`
//! seeded from the base seed plus the feature index, so a batch is
//! reproducible regardless of thread scheduling. Naming and writing happen
//! afterwards, sequentially and in input order.

use std::path::PathBuf;
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use time::OffsetDateTime;
use tracing::{info, warn};
use trajectory::config::SimulationConfig;
use trajectory::errors::SimulationError;
use trajectory::models::Trajectory;
use trajectory::observers::TracingObserver;
use trajectory::person::{PersonProfile, Team};
use trajectory::simulator::TrajectorySimulator;
use trajectory::terrain::ElevationProvider;

use crate::errors::BatchError;
use crate::export::{self, FeatureRecord};
use crate::input::FeatureInput;
use crate::naming::{NamingState, TrajectoryNamer};

pub const RECORDS_FILE: &str = "trajectories.json";

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    pub seed: u64,
    /// Used for features without their own start time.
    pub start_time: OffsetDateTime,
    /// Simulate every feature with this person instead of its own.
    pub person_number: Option<u32>,
}

/// Paths written for one trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenTrajectory {
    pub name: String,
    pub feature_id: String,
    pub gpx: PathBuf,
    pub summary: PathBuf,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub written: Vec<WrittenTrajectory>,
    /// One `BatchError::Simulation` per skipped feature.
    pub failed: Vec<BatchError>,
    pub records: Option<PathBuf>,
}

pub struct BatchRunner<'c> {
    config: &'c SimulationConfig,
    team: Team,
    elevation: Arc<dyn ElevationProvider>,
    namer: Box<dyn TrajectoryNamer>,
}

impl<'c> BatchRunner<'c> {
    pub fn new(
        config: &'c SimulationConfig,
        elevation: Arc<dyn ElevationProvider>,
        namer: Box<dyn TrajectoryNamer>,
    ) -> Self {
        Self {
            config,
            team: config.team(),
            elevation,
            namer,
        }
    }

    /// Picks the person for a feature: the numbered one when configured,
    /// otherwise a random team member, otherwise the flat profile.
    pub fn select_person(&self, number: Option<u32>, rng: &mut ChaCha8Rng) -> PersonProfile {
        self.team
            .select(number, rng)
            .cloned()
            .unwrap_or_else(|| self.config.profile_for(number))
    }

    /// Simulates one feature with its derived seed.
    pub fn simulate_one(
        &self,
        index: usize,
        feature: &FeatureInput,
        options: &BatchOptions,
    ) -> Result<Trajectory, SimulationError> {
        let mut rng = ChaCha8Rng::seed_from_u64(options.seed.wrapping_add(index as u64));
        let profile = self.select_person(options.person_number.or(feature.person_number), &mut rng);
        let start_time = feature.start_time.unwrap_or(options.start_time);

        TrajectorySimulator::new(self.config)
            .with_elevation(self.elevation.clone())
            .with_observer(Box::new(TracingObserver))
            .with_polygon_id(feature.id_or(index))
            .simulate(&feature.polygon(), &profile, start_time, &mut rng)
    }

    /// Simulates every feature and writes the outputs.
    ///
    /// Failed features are logged and reported, not fatal. IO errors are.
    pub fn run(&self, features: &[FeatureInput], options: &BatchOptions) -> Result<BatchReport, BatchError> {
        std::fs::create_dir_all(&options.output_dir)?;

        let results: Vec<Result<Trajectory, SimulationError>> = features
            .par_iter()
            .enumerate()
            .map(|(index, feature)| self.simulate_one(index, feature, options))
            .collect();

        let mut report = BatchReport::default();
        let mut naming = NamingState::default();
        let mut records = Vec::new();

        for ((index, feature), result) in features.iter().enumerate().zip(results) {
            let feature_id = feature.id_or(index);
            let trajectory = match result {
                Ok(t) => t,
                Err(source) => {
                    let e = BatchError::Simulation {
                        id: feature_id,
                        source,
                    };
                    warn!(error = %e, "Skipping feature");
                    report.failed.push(e);
                    continue;
                }
            };

            let name = self.namer.name(feature, &mut naming);
            let gpx = options.output_dir.join(format!("{name}.gpx"));
            let summary = options.output_dir.join(format!("{name}.txt"));
            export::write_gpx(&gpx, &name, &trajectory)?;
            export::write_summary(&summary, &trajectory.summary(&name))?;
            records.push(FeatureRecord::new(&name, &feature_id, &trajectory));

            report.written.push(WrittenTrajectory {
                name,
                feature_id,
                gpx,
                summary,
            });
        }

        if !records.is_empty() {
            let path = options.output_dir.join(RECORDS_FILE);
            export::write_records(&path, &records)?;
            report.records = Some(path);
        }

        info!(
            written = report.written.len(),
            failed = report.failed.len(),
            "Batch finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::KeyedIndexNamer;
    use trajectory::terrain::FlatElevation;

    fn config_with_team() -> SimulationConfig {
        SimulationConfig::from_json(
            r#"{ "gps": { "coordinate_system": "local" },
                 "persons": [ { "number": 1, "max_speed": 1.2 }, { "number": 2, "min_speed": 1.0 } ] }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_select_person() {
        let config = config_with_team();
        let runner = BatchRunner::new(
            &config,
            Arc::new(FlatElevation::default()),
            Box::new(KeyedIndexNamer::new(vec![])),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        assert_eq!(runner.select_person(Some(2), &mut rng).number, 2);
        assert!([1, 2].contains(&runner.select_person(None, &mut rng).number));
        assert!([1, 2].contains(&runner.select_person(Some(9), &mut rng).number));

        let lone = SimulationConfig::default();
        let runner = BatchRunner::new(
            &lone,
            Arc::new(FlatElevation::default()),
            Box::new(KeyedIndexNamer::new(vec![])),
        );
        assert_eq!(runner.select_person(Some(4), &mut rng).number, 4);
    }
}
