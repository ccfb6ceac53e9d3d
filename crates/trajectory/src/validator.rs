//! Coverage validation of candidate trajectories.
//!
//! A candidate covers its polygon well when the polygon traced by its reported
//! points has an area close to the source polygon's.

use geo::{Area, Coord, LineString, Polygon};
use rand::{Rng, RngCore};

use crate::config::{CoverageMode, SimulationConfig, TrajectoryConfig};

/// Acceptance rule for the coverage ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoveragePolicy {
    Threshold { min: f64 },
    Range { min: f64, max: f64 },
}

impl CoveragePolicy {
    pub fn from_config(config: &TrajectoryConfig) -> Self {
        match config.coverage_mode {
            CoverageMode::Threshold => Self::Threshold {
                min: config.area_threshold,
            },
            CoverageMode::Range => Self::Range {
                min: config.area_tolerance_min,
                max: config.area_tolerance_max,
            },
        }
    }

    pub fn accepts(&self, ratio: f64) -> bool {
        match *self {
            Self::Threshold { min } => ratio >= min,
            Self::Range { min, max } => (min..=max).contains(&ratio),
        }
    }
}

/// What to do with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Re-walk the last `segments` segments from a checkpoint.
    Backtrack { segments: usize },
    /// Discard the attempt.
    Restart,
}

#[derive(Debug, Clone)]
pub struct TrajectoryValidator {
    pub policy: CoveragePolicy,
    back_count: u32,
    back_probability: f64,
}

impl TrajectoryValidator {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            policy: CoveragePolicy::from_config(&config.trajectory),
            back_count: config.simulation.back_count,
            back_probability: config.simulation.back_probability,
        }
    }

    /// Area of the closed ring through `points` over `source_area`.
    ///
    /// Fewer than three points enclose nothing.
    pub fn coverage_ratio(source_area: f64, points: &[Coord]) -> f64 {
        if points.len() < 3 || source_area <= 0.0 {
            return 0.0;
        }
        let traced = Polygon::new(LineString::from(points.to_vec()), vec![]);
        traced.unsigned_area() / source_area
    }

    /// Coverage ratio of `candidate` against `source`.
    pub fn polygon_ratio(source: &Polygon<f64>, candidate: &Polygon<f64>) -> f64 {
        let points: Vec<Coord> = candidate.exterior().coords().copied().collect();
        Self::coverage_ratio(source.unsigned_area(), &points)
    }

    /// Decides on a candidate with coverage `ratio`.
    ///
    /// A rejected attempt backtracks while backtracks remain and the
    /// `back_probability` draw succeeds; otherwise it restarts.
    pub fn judge(
        &self,
        ratio: f64,
        walked_segments: usize,
        backtracks_used: u32,
        rng: &mut dyn RngCore,
    ) -> Verdict {
        if self.policy.accepts(ratio) {
            return Verdict::Accept;
        }
        if walked_segments == 0 || backtracks_used >= self.back_count {
            return Verdict::Restart;
        }
        if rng.r#gen::<f64>() < self.back_probability {
            Verdict::Backtrack {
                segments: (self.back_count as usize).min(walked_segments),
            }
        } else {
            Verdict::Restart
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn square(size: f64) -> Vec<Coord> {
        vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: size, y: 0.0 },
            Coord { x: size, y: size },
            Coord { x: 0.0, y: size },
        ]
    }

    #[test]
    fn test_coverage_ratio() {
        assert!((TrajectoryValidator::coverage_ratio(10_000.0, &square(100.0)) - 1.0).abs() < 1e-12);
        assert!((TrajectoryValidator::coverage_ratio(10_000.0, &square(90.0)) - 0.81).abs() < 1e-12);
        assert_eq!(TrajectoryValidator::coverage_ratio(10_000.0, &square(100.0)[..2]), 0.0);
    }

    #[test]
    fn test_polygon_ratio() {
        let source = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)];
        let inner = polygon![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 5.0, y: 10.0), (x: 0.0, y: 10.0)];
        assert!((TrajectoryValidator::polygon_ratio(&source, &inner) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_policies() {
        let threshold = CoveragePolicy::Threshold { min: 0.9 };
        assert!(threshold.accepts(0.9) && threshold.accepts(1.2));
        assert!(!threshold.accepts(0.89));

        let range = CoveragePolicy::Range { min: 0.95, max: 1.0 };
        assert!(range.accepts(0.97));
        assert!(!range.accepts(1.01) && !range.accepts(0.9));
    }

    #[test]
    fn test_policy_from_config() {
        let config = TrajectoryConfig {
            coverage_mode: CoverageMode::Range,
            ..TrajectoryConfig::default()
        };
        assert_eq!(
            CoveragePolicy::from_config(&config),
            CoveragePolicy::Range { min: 0.95, max: 1.0 }
        );
    }

    #[test]
    fn test_backtrack_verdicts() {
        let mut config = SimulationConfig::default();
        config.simulation.back_probability = 1.0;
        config.simulation.back_count = 2;
        let validator = TrajectoryValidator::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        assert_eq!(validator.judge(0.95, 4, 0, &mut rng), Verdict::Accept);
        assert_eq!(
            validator.judge(0.5, 4, 0, &mut rng),
            Verdict::Backtrack { segments: 2 }
        );
        assert_eq!(
            validator.judge(0.5, 1, 1, &mut rng),
            Verdict::Backtrack { segments: 1 }
        );
        assert_eq!(validator.judge(0.5, 4, 2, &mut rng), Verdict::Restart);

        config.simulation.back_probability = 0.0;
        let never = TrajectoryValidator::new(&config);
        assert_eq!(never.judge(0.5, 4, 0, &mut rng), Verdict::Restart);
    }
}
