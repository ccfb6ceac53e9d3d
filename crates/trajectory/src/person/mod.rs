//! Walking persons: static profiles, per-run physical state and movement models.
//!
//! A [`PersonProfile`] holds the tuning of one patroller. A [`PersonState`] is
//! the mutable physical state of one in-flight simulation attempt. Movement
//! models advance the state one time step at a time.

mod movement;

pub use movement::{
    MovementModel, RealisticMovement, SegmentWalk, SimpleMovement, TruePosition, movement_model,
    walk_segment,
};

use geo::Coord;
use rand::Rng;

use crate::config::{self, PersonConfig};
use crate::errors::ConfigError;

/// Static tuning parameters of one person.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonProfile {
    pub number: u32,
    /// Walking speed bounds in m/s.
    pub min_speed: f64,
    pub max_speed: f64,
    pub max_stamina: f64,
    /// Stamina spent per meter walked at minimum speed.
    pub stamina_consumption_base: f64,
    /// Stamina regained per second of rest.
    pub stamina_recovery_rate: f64,
    /// Share of the resting recovery rate regained while walking tired.
    pub walking_recovery_factor: f64,
    /// Stamina a resting person waits for before walking on.
    pub min_stamina_to_walk: f64,
    /// Radians.
    pub max_deviation_angle: f64,
    pub deviation_probability: f64,
}

impl PersonProfile {
    /// Builds a profile from the flat `person` config block.
    pub fn from_config(number: u32, config: &PersonConfig) -> Self {
        Self {
            number,
            min_speed: config.speed_range.0,
            max_speed: config.speed_range.1,
            max_stamina: config.max_stamina,
            stamina_consumption_base: config.stamina_consumption_base,
            stamina_recovery_rate: config.stamina_recovery_rate,
            walking_recovery_factor: config.walking_recovery_factor,
            min_stamina_to_walk: config.min_stamina_to_walk,
            max_deviation_angle: config.max_deviation_angle.to_radians(),
            deviation_probability: config.deviation_probability,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        config::positive("person.min_speed", self.min_speed)?;
        config::ordered("person.max_speed", self.min_speed, self.max_speed)?;
        config::positive("person.max_stamina", self.max_stamina)?;
        config::unit("person.stamina_consumption_base", self.stamina_consumption_base)?;
        // A resting person must eventually walk again
        config::positive("person.stamina_recovery_rate", self.stamina_recovery_rate)?;
        config::unit("person.stamina_recovery_rate", self.stamina_recovery_rate)?;
        config::unit("person.walking_recovery_factor", self.walking_recovery_factor)?;
        config::non_negative("person.min_stamina_to_walk", self.min_stamina_to_walk)?;
        config::ordered(
            "person.min_stamina_to_walk",
            self.min_stamina_to_walk,
            self.max_stamina,
        )?;
        config::unit("person.deviation_probability", self.deviation_probability)?;
        if !(0.0..std::f64::consts::FRAC_PI_2).contains(&self.max_deviation_angle) {
            return Err(ConfigError::invalid(
                "person.max_deviation_angle",
                format!(
                    "{} degrees is outside [0, 90)",
                    self.max_deviation_angle.to_degrees()
                ),
            ));
        }
        Ok(())
    }

    /// Stamina spent walking `distance` meters at `speed`.
    ///
    /// Faster walking costs up to twice the base rate.
    pub fn stamina_cost(&self, distance: f64, speed: f64) -> f64 {
        let span = self.max_speed - self.min_speed;
        let speed_factor = if span > f64::EPSILON {
            ((speed - self.min_speed).max(0.0) + 1.0).ln() / (span + 1.0).ln()
        } else {
            0.0
        };
        distance * self.stamina_consumption_base * (1.0 + speed_factor.clamp(0.0, 1.0))
    }
}

/// Phase of the movement state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementPhase {
    Walking,
    Resting,
    /// Walking with a held heading deviation.
    Deviating,
    /// Steering back toward the edge.
    Correcting,
}

/// Mutable physical state of one person during one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonState {
    pub position: Coord,
    /// Radians, counter-clockwise from +x.
    pub heading: f64,
    /// m/s, 0 while resting.
    pub speed: f64,
    pub stamina: f64,
    /// Seconds since the walk started.
    pub elapsed: f64,
    pub backtracks: u32,
    pub phase: MovementPhase,
    /// Held deviation from the intended bearing, radians.
    pub deviation: f64,
}

impl PersonState {
    /// A rested person standing at `position`.
    pub fn new(profile: &PersonProfile, position: Coord) -> Self {
        Self {
            position,
            heading: 0.0,
            speed: (profile.min_speed + profile.max_speed) / 2.0,
            stamina: profile.max_stamina,
            elapsed: 0.0,
            backtracks: 0,
            phase: MovementPhase::Walking,
            deviation: 0.0,
        }
    }

    pub fn is_resting(&self) -> bool {
        self.phase == MovementPhase::Resting
    }
}

/// The numbered persons available to a batch.
#[derive(Debug, Clone, Default)]
pub struct Team {
    members: Vec<PersonProfile>,
}

impl Team {
    pub fn new(members: Vec<PersonProfile>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, number: u32) -> Option<&PersonProfile> {
        self.members.iter().find(|p| p.number == number)
    }

    pub fn random(&self, rng: &mut impl Rng) -> Option<&PersonProfile> {
        if self.members.is_empty() {
            None
        } else {
            Some(&self.members[rng.gen_range(0..self.members.len())])
        }
    }

    /// The person with `number`, or a random member when absent or unknown.
    pub fn select(&self, number: Option<u32>, rng: &mut impl Rng) -> Option<&PersonProfile> {
        number
            .and_then(|n| self.get(n))
            .or_else(|| self.random(rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn profile(number: u32) -> PersonProfile {
        PersonProfile::from_config(number, &PersonConfig::default())
    }

    #[test]
    fn test_default_profile_is_valid() {
        let p = profile(1);
        assert!(p.validate().is_ok());
        assert!((p.max_deviation_angle - 10f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn test_zero_recovery_is_rejected() {
        let mut p = profile(1);
        p.stamina_recovery_rate = 0.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_stamina_cost_grows_with_speed() {
        let p = profile(1);
        let slow = p.stamina_cost(10.0, p.min_speed);
        let fast = p.stamina_cost(10.0, p.max_speed);
        assert!((slow - 10.0 * p.stamina_consumption_base).abs() < 1e-12);
        assert!((fast - 2.0 * slow).abs() < 1e-9);
    }

    #[test]
    fn test_stamina_cost_with_fixed_speed() {
        let mut p = profile(1);
        p.max_speed = p.min_speed;
        assert!(p.stamina_cost(1.0, p.min_speed).is_finite());
    }

    #[test]
    fn test_team_selection() {
        let team = Team::new(vec![profile(1), profile(2), profile(3)]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert_eq!(team.select(Some(2), &mut rng).unwrap().number, 2);
        let fallback = team.select(Some(9), &mut rng).unwrap().number;
        assert!((1..=3).contains(&fallback));
        assert!(Team::default().select(None, &mut rng).is_none());
    }
}
