//! GPS receiver simulation: signal strength, accuracy, position jitter and
//! sampling.
//!
//! The device sees the dense true positions of the walk and decides which of
//! them become fixes. A fix carries the jittered planar position; it becomes a
//! [`GpsSample`] once the trajectory is accepted and georeferenced.

use geo::Coord;
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::config::{GpsConfig, SamplingStrategy};
use crate::geometry::distance;
use crate::person::TruePosition;
use crate::projection::Georeference;

/// One reported GPS point of an accepted trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsSample {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Reported position in the source coordinate system.
    pub x: f64,
    pub y: f64,
    pub longitude: f64,
    pub latitude: f64,
    pub elevation: Option<f64>,
    /// Meters.
    pub accuracy: f64,
    pub signal_strength: f64,
    /// Radians, counter-clockwise from +x.
    pub heading: f64,
}

/// A sampled measurement in planar walking coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    /// Seconds since the walk started.
    pub elapsed: f64,
    /// Where the person actually was.
    pub truth: Coord,
    /// Where the receiver said they were.
    pub reported: Coord,
    pub accuracy: f64,
    pub signal_strength: f64,
    pub heading: f64,
}

impl Fix {
    pub fn to_sample(&self, start_time: OffsetDateTime, georef: &Georeference) -> GpsSample {
        let source = georef.to_source(self.reported);
        let (longitude, latitude) = georef.to_wgs84(self.reported);
        GpsSample {
            timestamp: start_time + Duration::seconds_f64(self.elapsed),
            x: source.x,
            y: source.y,
            longitude,
            latitude,
            elevation: None,
            accuracy: self.accuracy,
            signal_strength: self.signal_strength,
            heading: self.heading,
        }
    }
}

/// Receiver state for one attempt: the current signal strength and the last
/// sampled true position.
#[derive(Debug, Clone)]
pub struct GpsDevice<'c> {
    config: &'c GpsConfig,
    /// Signal at power-on, restored when every fix is discarded.
    initial_signal: f64,
    signal: f64,
    last: Option<(Coord, f64)>,
}

impl<'c> GpsDevice<'c> {
    pub fn new(config: &'c GpsConfig, rng: &mut dyn RngCore) -> Self {
        let signal = rng
            .gen_range(config.initial_signal_strength_min..=config.initial_signal_strength_max)
            .clamp(config.min_signal_strength, config.max_signal_strength);
        Self {
            config,
            initial_signal: signal,
            signal,
            last: None,
        }
    }

    pub fn signal_strength(&self) -> f64 {
        self.signal
    }

    /// Whether the sampling strategy takes a fix at `truth`.
    pub fn is_due(&self, truth: &TruePosition) -> bool {
        let Some((position, elapsed)) = self.last else {
            return true;
        };
        let far = distance(position, truth.position) >= self.config.sampling_distance;
        // Guard against float drift in accumulated step times
        let late = truth.elapsed - elapsed >= self.config.sampling_interval - 1e-9;
        match self.config.sampling_strategy {
            SamplingStrategy::Distance => far,
            SamplingStrategy::Time => late,
            SamplingStrategy::Hybrid => far || late,
        }
    }

    /// Takes a fix at `truth` when one is due.
    pub fn observe(&mut self, truth: &TruePosition, rng: &mut dyn RngCore) -> Option<Fix> {
        self.is_due(truth).then(|| self.measure(truth, rng))
    }

    /// Rewinds the receiver to the state it had right after `fix`, or to
    /// power-on when there is none.
    ///
    /// Used when a backtrack discards the fixes after a checkpoint.
    pub fn resume_after(&mut self, fix: Option<&Fix>) {
        self.last = fix.map(|f| (f.truth, f.elapsed));
        self.signal = fix.map_or(self.initial_signal, |f| f.signal_strength);
    }

    fn measure(&mut self, truth: &TruePosition, rng: &mut dyn RngCore) -> Fix {
        let cfg = self.config;
        let accuracy = if self.last.is_none() {
            cfg.initial_accuracy.clamp(cfg.min_accuracy, cfg.max_accuracy)
        } else {
            self.drift_signal(rng);
            self.accuracy(rng)
        };

        let sigma = accuracy * cfg.jitter_ratio;
        let dx: f64 = rng.sample(StandardNormal);
        let dy: f64 = rng.sample(StandardNormal);
        self.last = Some((truth.position, truth.elapsed));

        Fix {
            elapsed: truth.elapsed,
            truth: truth.position,
            reported: Coord {
                x: truth.position.x + dx * sigma,
                y: truth.position.y + dy * sigma,
            },
            accuracy,
            signal_strength: self.signal,
            heading: truth.heading,
        }
    }

    fn drift_signal(&mut self, rng: &mut dyn RngCore) {
        let cfg = self.config;
        let step = rng.gen_range(-cfg.signal_step..=cfg.signal_step);
        self.signal = (self.signal + step).clamp(cfg.min_signal_strength, cfg.max_signal_strength);
    }

    /// Weak signal maps to the worst accuracy, full signal to the best.
    fn accuracy(&self, rng: &mut dyn RngCore) -> f64 {
        let cfg = self.config;
        let span = cfg.max_signal_strength - cfg.min_signal_strength;
        let quality = if span > f64::EPSILON {
            (self.signal - cfg.min_signal_strength) / span
        } else {
            self.signal
        };
        let noise = if cfg.accuracy_variation > 0.0 {
            rng.gen_range(-cfg.accuracy_variation..=cfg.accuracy_variation)
        } else {
            0.0
        };
        (cfg.max_accuracy - quality * (cfg.max_accuracy - cfg.min_accuracy) + noise)
            .clamp(cfg.min_accuracy, cfg.max_accuracy)
    }
}
