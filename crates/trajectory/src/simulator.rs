//! Simulation orchestrator.
//!
//! One `simulate` call walks the polygon boundary segment by segment, feeds
//! the true positions through the GPS device, validates the coverage of the
//! sampled points and either accepts, backtracks over the last segments, or
//! restarts the attempt. Accepted trajectories are georeferenced and enriched
//! with elevations in a single batch lookup.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use geo::{Coord, MapCoords, Polygon};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::errors::{ElevationError, SimulationError};
use crate::geometry::{Boundary, Segment, distance};
use crate::gps::{Fix, GpsDevice, GpsSample};
use crate::models::Trajectory;
use crate::observers::{ObserverSet, TrajectoryEvent, TrajectoryObserver};
use crate::person::{MovementModel, PersonProfile, PersonState, TruePosition, movement_model, walk_segment};
use crate::projection::Georeference;
use crate::terrain::{ElevationProvider, FlatElevation};
use crate::validator::{TrajectoryValidator, Verdict};

/// State restored by a backtrack: the person before a segment and the number
/// of fixes recorded up to then.
#[derive(Debug, Clone)]
struct Checkpoint {
    person: PersonState,
    fixes: usize,
}

enum AttemptOutcome {
    Accepted {
        fixes: Vec<Fix>,
        area_ratio: f64,
        backtracks: u32,
    },
    Rejected {
        area_ratio: f64,
        discarded_segments: usize,
    },
}

/// Everything fixed for the duration of one `simulate` call.
struct Run<'a> {
    segments: &'a [Segment],
    model: &'a dyn MovementModel,
    validator: &'a TrajectoryValidator,
    source_area: f64,
    source_perimeter: f64,
    dt: f64,
}

pub struct TrajectorySimulator<'c> {
    config: &'c SimulationConfig,
    elevation: Arc<dyn ElevationProvider>,
    observers: ObserverSet,
    polygon_id: Option<String>,
}

impl<'c> TrajectorySimulator<'c> {
    /// A simulator on flat terrain with no observers.
    pub fn new(config: &'c SimulationConfig) -> Self {
        Self {
            config,
            elevation: Arc::new(FlatElevation::default()),
            observers: ObserverSet::default(),
            polygon_id: None,
        }
    }

    pub fn with_elevation(mut self, provider: Arc<dyn ElevationProvider>) -> Self {
        self.elevation = provider;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn TrajectoryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_polygon_id(mut self, id: impl Into<String>) -> Self {
        self.polygon_id = Some(id.into());
        self
    }

    /// Observer handler errors so far.
    pub fn observer_failures(&self) -> usize {
        self.observers.failures()
    }

    /// Simulates the person numbered `person_number`, resolved from the config.
    pub fn simulate_feature<R: Rng>(
        &mut self,
        polygon: &Polygon<f64>,
        person_number: Option<u32>,
        start_time: OffsetDateTime,
        rng: &mut R,
    ) -> Result<Trajectory, SimulationError> {
        let profile = self.config.profile_for(person_number);
        self.simulate(polygon, &profile, start_time, rng)
    }

    /// Runs `simulate` with a fresh `ChaCha8Rng` seeded from `seed`.
    pub fn simulate_seeded(
        &mut self,
        polygon: &Polygon<f64>,
        profile: &PersonProfile,
        start_time: OffsetDateTime,
        seed: u64,
    ) -> Result<Trajectory, SimulationError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.simulate(polygon, profile, start_time, &mut rng)
    }

    /// Generates one accepted trajectory around `polygon`.
    ///
    /// Fails with [`SimulationError::Failed`] once `max_attempts` attempts
    /// were rejected.
    pub fn simulate<R: Rng>(
        &mut self,
        polygon: &Polygon<f64>,
        profile: &PersonProfile,
        start_time: OffsetDateTime,
        rng: &mut R,
    ) -> Result<Trajectory, SimulationError> {
        let config = self.config;
        config.validate()?;
        profile.validate()?;

        let anchor = polygon
            .exterior()
            .0
            .first()
            .copied()
            .unwrap_or(Coord { x: 0.0, y: 0.0 });
        let georef = Georeference::new(config.coordinate_system()?, anchor);
        let planar = polygon.map_coords(|c| georef.to_planar(c));
        let boundary = Boundary::from_polygon(&planar)?;
        let segments = boundary.segments(config.simulation.start_vertex);

        let model = movement_model(profile.clone(), &config.person);
        let validator = TrajectoryValidator::new(config);
        let run = Run {
            segments: &segments,
            model: model.as_ref(),
            validator: &validator,
            source_area: boundary.area(),
            source_perimeter: boundary.perimeter(),
            dt: config.time_step_seconds(),
        };
        let rng: &mut dyn RngCore = rng;

        let polygon_id = self.polygon_id.clone();
        self.observers.notify(&TrajectoryEvent::StartRecording {
            polygon_id: polygon_id.as_deref(),
            person_number: profile.number,
        });

        debug!(
            observers = self.observers.len(),
            segments = segments.len(),
            perimeter = run.source_perimeter,
            "Simulation started"
        );

        let max_attempts = config.simulation.max_attempts;
        let mut last_area_ratio = 0.0;
        let mut rejected_segments = 0;

        for attempt in 1..=max_attempts {
            self.observers
                .notify(&TrajectoryEvent::AttemptStarted { attempt });

            match self.run_attempt(&run, attempt, rng) {
                AttemptOutcome::Accepted {
                    fixes,
                    area_ratio,
                    backtracks,
                } => {
                    info!(
                        polygon = polygon_id.as_deref().unwrap_or("-"),
                        person = profile.number,
                        attempt,
                        area_ratio,
                        samples = fixes.len(),
                        "Trajectory accepted"
                    );
                    let trajectory = self.finish(
                        &fixes,
                        &georef,
                        start_time,
                        profile.number,
                        area_ratio,
                        attempt,
                        backtracks,
                        &run,
                    );
                    if !self.observers.is_empty() {
                        for (index, sample) in trajectory.samples.iter().enumerate() {
                            self.observers
                                .notify(&TrajectoryEvent::DataUpdate { index, sample });
                        }
                    }
                    self.observers.notify(&TrajectoryEvent::Succeeded {
                        trajectory: &trajectory,
                    });
                    self.observers.notify(&TrajectoryEvent::StopRecording);
                    return Ok(trajectory);
                }
                AttemptOutcome::Rejected {
                    area_ratio,
                    discarded_segments,
                } => {
                    debug!(attempt, area_ratio, "Attempt restarted");
                    last_area_ratio = area_ratio;
                    rejected_segments += discarded_segments;
                }
            }
        }

        self.observers.notify(&TrajectoryEvent::Failed {
            attempts: max_attempts,
            last_area_ratio,
        });
        self.observers.notify(&TrajectoryEvent::StopRecording);
        Err(SimulationError::Failed {
            attempts: max_attempts,
            last_area_ratio,
            rejected_segments,
        })
    }

    fn run_attempt(&mut self, run: &Run<'_>, attempt: u32, rng: &mut dyn RngCore) -> AttemptOutcome {
        let config = self.config;
        let sim = &config.simulation;
        let segments = run.segments;
        let ring_start = segments[0].start;
        let last_segment = segments.len() - 1;

        let mut person = PersonState::new(run.model.profile(), ring_start);
        let mut device = GpsDevice::new(&config.gps, rng);
        let mut fixes: Vec<Fix> = device
            .observe(&TruePosition::from_state(&person), rng)
            .into_iter()
            .collect();
        let mut checkpoints: Vec<Checkpoint> = Vec::with_capacity(segments.len());
        let mut track: Vec<TruePosition> = Vec::new();
        let mut next = 0;
        let mut discarded = 0;

        loop {
            while next < segments.len() {
                checkpoints.truncate(next);
                checkpoints.push(Checkpoint {
                    person: person.clone(),
                    fixes: fixes.len(),
                });

                let closing = (next == last_segment).then_some((ring_start, sim.closing_distance));
                track.clear();
                let walk = walk_segment(
                    run.model,
                    &mut person,
                    &segments[next],
                    run.dt,
                    sim.tolerance,
                    closing,
                    rng,
                    &mut track,
                );
                if walk.forced {
                    debug!(attempt, segment = next, steps = walk.steps, "Segment force-completed");
                }
                fixes.extend(track.iter().filter_map(|truth| device.observe(truth, rng)));
                next += 1;
            }

            let points: Vec<Coord> = fixes.iter().map(|f| f.reported).collect();
            let area_ratio = TrajectoryValidator::coverage_ratio(run.source_area, &points);
            let verdict = if fixes.len() < 2 {
                Verdict::Restart
            } else {
                run.validator
                    .judge(area_ratio, segments.len(), person.backtracks, rng)
            };

            match verdict {
                Verdict::Accept => {
                    return AttemptOutcome::Accepted {
                        fixes,
                        area_ratio,
                        backtracks: person.backtracks,
                    };
                }
                Verdict::Backtrack { segments: count } => {
                    self.observers.notify(&TrajectoryEvent::AttemptRejected {
                        attempt,
                        area_ratio,
                        verdict,
                    });
                    self.observers.notify(&TrajectoryEvent::PauseRecording {
                        attempt,
                        segments: count,
                    });

                    let from = segments.len() - count;
                    let checkpoint = checkpoints[from].clone();
                    let used = person.backtracks + 1;
                    person = checkpoint.person;
                    person.backtracks = used;
                    fixes.truncate(checkpoint.fixes);
                    device.resume_after(fixes.last());
                    discarded += count;
                    next = from;
                    debug!(attempt, backtrack = used, from_segment = from, area_ratio, "Backtracking");

                    self.observers.notify(&TrajectoryEvent::ResumeRecording {
                        attempt,
                        from_segment: from,
                    });
                }
                Verdict::Restart => {
                    self.observers.notify(&TrajectoryEvent::AttemptRejected {
                        attempt,
                        area_ratio,
                        verdict,
                    });
                    return AttemptOutcome::Rejected {
                        area_ratio,
                        discarded_segments: discarded + segments.len(),
                    };
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        fixes: &[Fix],
        georef: &Georeference,
        start_time: OffsetDateTime,
        person_number: u32,
        area_ratio: f64,
        attempts: u32,
        backtracks: u32,
        run: &Run<'_>,
    ) -> Trajectory {
        let mut samples: Vec<GpsSample> = fixes
            .iter()
            .map(|fix| fix.to_sample(start_time, georef))
            .collect();
        let total_distance = fixes
            .windows(2)
            .map(|pair| distance(pair[0].reported, pair[1].reported))
            .sum();
        let elevation_error = self.enrich(&mut samples).err();

        Trajectory {
            samples,
            person_number,
            polygon_id: self.polygon_id.clone(),
            start_time,
            area_ratio,
            attempts,
            backtracks,
            source_area: run.source_area,
            source_perimeter: run.source_perimeter,
            total_distance,
            elevation_error,
        }
    }

    /// Fills in elevations with one batch lookup. On failure the samples keep
    /// `elevation: None`.
    fn enrich(&self, samples: &mut [GpsSample]) -> Result<(), ElevationError> {
        let points: Vec<(f64, f64)> = samples.iter().map(|s| (s.longitude, s.latitude)).collect();
        let result = match self.config.elevation.timeout_ms {
            Some(ms) => batch_with_timeout(self.elevation.clone(), points, ms),
            None => self.elevation.batch_elevation(&points),
        };

        let values = result.and_then(|values| {
            if values.len() == samples.len() {
                Ok(values)
            } else {
                Err(ElevationError::Backend(format!(
                    "expected {} elevations, got {}",
                    samples.len(),
                    values.len()
                )))
            }
        });

        match values {
            Ok(values) => {
                for (sample, value) in samples.iter_mut().zip(values) {
                    sample.elevation = Some(value);
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Elevation lookup failed, keeping trajectory without elevations");
                Err(e)
            }
        }
    }
}

/// Runs the batch lookup on a worker thread and gives up after `ms`.
///
/// A timed-out worker is left to finish on its own; its result is dropped.
fn batch_with_timeout(
    provider: Arc<dyn ElevationProvider>,
    points: Vec<(f64, f64)>,
    ms: u64,
) -> Result<Vec<f64>, ElevationError> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(provider.batch_elevation(&points));
    });
    match rx.recv_timeout(Duration::from_millis(ms)) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(ElevationError::Timeout(ms)),
        Err(RecvTimeoutError::Disconnected) => Err(ElevationError::Backend(
            "elevation worker exited without a result".to_string(),
        )),
    }
}
