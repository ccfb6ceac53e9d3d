//! Configuration types for trajectory simulation.
//!
//! The document is JSON with nested groups (`simulation`, `gps`, `person`,
//! `persons`, `trajectory`, `elevation`). Every group is optional and falls
//! back to its `Default`. Call [`SimulationConfig::validate`] (done by the
//! loaders) before handing a config to the simulator.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::person::{PersonProfile, Team};
use crate::projection::CoordinateSystem;

/// Full, validated parameter set shared read-only by every run of a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub simulation: SimulationParams,
    pub gps: GpsConfig,
    /// Defaults applied to every person without an individual entry.
    pub person: PersonConfig,
    /// Individually numbered persons. An entry supersedes the flat `person` block.
    pub persons: Vec<PersonOverride>,
    pub trajectory: TrajectoryConfig,
    pub elevation: ElevationConfig,
}

/// Stepping, termination and retry parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Duration of one movement step, in `gps.time_unit` units.
    pub time_step: f64,
    /// Remaining along-edge distance at which a segment counts as walked (meters).
    pub tolerance: f64,
    /// Distance to the ring start that closes the final segment (meters).
    pub closing_distance: f64,
    /// Full restarts allowed before giving up.
    #[serde(alias = "max_retries")]
    pub max_attempts: u32,
    /// Backtracks allowed per attempt, and segments re-walked per backtrack.
    pub back_count: u32,
    /// Probability that a rejected attempt backtracks instead of restarting.
    pub back_probability: f64,
    /// Ring vertex the walk starts from (taken modulo the vertex count).
    pub start_vertex: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            time_step: 1.0,
            tolerance: 1.0,
            closing_distance: 2.0,
            max_attempts: 10,
            back_count: 2,
            back_probability: 0.1,
            start_vertex: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpsDeviceType {
    #[default]
    Advanced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingStrategy {
    /// Sample once the device moved `sampling_distance` from the last sample.
    #[default]
    Distance,
    /// Sample every `sampling_interval` seconds.
    Time,
    /// Sample when either condition holds.
    Hybrid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Second,
    Millisecond,
    Minute,
    Hour,
}

impl TimeUnit {
    /// Number of seconds in one unit.
    pub fn seconds(self) -> f64 {
        match self {
            TimeUnit::Second => 1.0,
            TimeUnit::Millisecond => 0.001,
            TimeUnit::Minute => 60.0,
            TimeUnit::Hour => 3600.0,
        }
    }
}

/// GPS receiver noise and sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    pub device_type: GpsDeviceType,
    /// Accuracy reported with the first fix (meters).
    pub initial_accuracy: f64,
    pub initial_signal_strength_min: f64,
    pub initial_signal_strength_max: f64,
    /// Best (smallest) accuracy value in meters.
    pub min_accuracy: f64,
    /// Worst (largest) accuracy value in meters.
    pub max_accuracy: f64,
    pub min_signal_strength: f64,
    pub max_signal_strength: f64,
    /// Largest signal change between two samples.
    pub signal_step: f64,
    /// Uniform noise added to the accuracy derived from signal strength.
    pub accuracy_variation: f64,
    /// Position jitter standard deviation as a fraction of accuracy.
    pub jitter_ratio: f64,
    pub sampling_strategy: SamplingStrategy,
    /// Minimum distance between two samples (meters).
    pub sampling_distance: f64,
    /// Seconds between two samples for the time based strategies.
    pub sampling_interval: f64,
    /// Coordinate system of the input polygons, e.g. `EPSG:4510` or `local`.
    pub coordinate_system: String,
    pub time_unit: TimeUnit,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            device_type: GpsDeviceType::Advanced,
            initial_accuracy: 5.0,
            initial_signal_strength_min: 0.8,
            initial_signal_strength_max: 1.0,
            min_accuracy: 2.5,
            max_accuracy: 12.0,
            min_signal_strength: 0.4,
            max_signal_strength: 1.0,
            signal_step: 0.05,
            accuracy_variation: 0.5,
            jitter_ratio: 0.1,
            sampling_strategy: SamplingStrategy::Distance,
            sampling_distance: 5.0,
            sampling_interval: 1.0,
            coordinate_system: "EPSG:4510".to_string(),
            time_unit: TimeUnit::Second,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementStrategy {
    /// Stamina, deviation and correction model.
    #[default]
    #[serde(alias = "advanced")]
    Realistic,
    /// Straight walking at a random speed.
    Simple,
}

/// Flat person block: movement strategy, correction behaviour and the
/// profile defaults used when no numbered person matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonConfig {
    pub movement_strategy: MovementStrategy,
    pub deviation_probability: f64,
    /// Degrees.
    pub max_deviation_angle: f64,
    /// Walking speed bounds in m/s.
    pub speed_range: (f64, f64),
    /// Lateral distance from the edge that triggers correction (meters).
    pub correction_threshold: f64,
    /// Fraction of the held deviation removed per correcting step.
    pub correction_factor: f64,
    pub max_stamina: f64,
    pub stamina_consumption_base: f64,
    pub stamina_recovery_rate: f64,
    pub walking_recovery_factor: f64,
    pub min_stamina_to_walk: f64,
}

impl Default for PersonConfig {
    fn default() -> Self {
        Self {
            movement_strategy: MovementStrategy::Realistic,
            deviation_probability: 0.1,
            max_deviation_angle: 10.0,
            speed_range: (0.8, 1.5),
            correction_threshold: 5.0,
            correction_factor: 0.5,
            max_stamina: 100.0,
            stamina_consumption_base: 0.05,
            stamina_recovery_rate: 0.1,
            walking_recovery_factor: 0.3,
            min_stamina_to_walk: 20.0,
        }
    }
}

/// A numbered person. Unset fields inherit from the flat `person` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonOverride {
    pub number: u32,
    pub min_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub max_stamina: Option<f64>,
    pub stamina_consumption_base: Option<f64>,
    pub stamina_recovery_rate: Option<f64>,
    pub walking_recovery_factor: Option<f64>,
    pub min_stamina_to_walk: Option<f64>,
    /// Degrees.
    pub max_deviation_angle: Option<f64>,
    pub deviation_probability: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageMode {
    /// Accept when the area ratio reaches `area_threshold`.
    #[default]
    Threshold,
    /// Accept when the area ratio lies in `[area_tolerance_min, area_tolerance_max]`.
    Range,
}

/// Coverage acceptance policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    pub coverage_mode: CoverageMode,
    pub area_threshold: f64,
    pub area_tolerance_min: f64,
    pub area_tolerance_max: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            coverage_mode: CoverageMode::Threshold,
            area_threshold: 0.9,
            area_tolerance_min: 0.95,
            area_tolerance_max: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElevationProviderKind {
    /// Flat terrain at 0 m.
    #[default]
    Default,
    /// ESRI ASCII grid DEM files listed in `provider_params.dem_path_list`.
    #[serde(alias = "raster")]
    Arcgis,
    /// Synthetic Perlin terrain tuned by `provider_params`.
    Custom,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    pub provider: ElevationProviderKind,
    pub provider_params: serde_json::Map<String, serde_json::Value>,
    /// Upper bound for the end-of-trajectory batch lookup.
    pub timeout_ms: Option<u64>,
}

impl SimulationConfig {
    /// Loads and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parses and validates a JSON config document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Step duration in seconds.
    pub fn time_step_seconds(&self) -> f64 {
        self.simulation.time_step * self.gps.time_unit.seconds()
    }

    pub fn coordinate_system(&self) -> Result<CoordinateSystem, ConfigError> {
        self.gps.coordinate_system.parse()
    }

    /// Resolves the profile of a person.
    ///
    /// A numbered entry in `persons` wins; otherwise the flat `person` block
    /// describes the person (numbered 0 when no number is given).
    pub fn profile_for(&self, number: Option<u32>) -> PersonProfile {
        number
            .and_then(|n| self.persons.iter().find(|p| p.number == n))
            .map(|entry| self.resolve(entry))
            .unwrap_or_else(|| PersonProfile::from_config(number.unwrap_or(0), &self.person))
    }

    /// All numbered persons, resolved against the flat block.
    pub fn team(&self) -> Team {
        Team::new(self.persons.iter().map(|p| self.resolve(p)).collect())
    }

    fn resolve(&self, entry: &PersonOverride) -> PersonProfile {
        let base = PersonProfile::from_config(entry.number, &self.person);
        PersonProfile {
            number: entry.number,
            min_speed: entry.min_speed.unwrap_or(base.min_speed),
            max_speed: entry.max_speed.unwrap_or(base.max_speed),
            max_stamina: entry.max_stamina.unwrap_or(base.max_stamina),
            stamina_consumption_base: entry
                .stamina_consumption_base
                .unwrap_or(base.stamina_consumption_base),
            stamina_recovery_rate: entry
                .stamina_recovery_rate
                .unwrap_or(base.stamina_recovery_rate),
            walking_recovery_factor: entry
                .walking_recovery_factor
                .unwrap_or(base.walking_recovery_factor),
            min_stamina_to_walk: entry
                .min_stamina_to_walk
                .unwrap_or(base.min_stamina_to_walk),
            max_deviation_angle: entry
                .max_deviation_angle
                .map(f64::to_radians)
                .unwrap_or(base.max_deviation_angle),
            deviation_probability: entry
                .deviation_probability
                .unwrap_or(base.deviation_probability),
        }
    }

    /// Checks every numeric field against its documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        positive("simulation.time_step", sim.time_step)?;
        positive("simulation.tolerance", sim.tolerance)?;
        positive("simulation.closing_distance", sim.closing_distance)?;
        if sim.max_attempts == 0 {
            return Err(ConfigError::invalid("simulation.max_attempts", "must be at least 1"));
        }
        unit("simulation.back_probability", sim.back_probability)?;

        let gps = &self.gps;
        non_negative("gps.initial_accuracy", gps.initial_accuracy)?;
        unit("gps.initial_signal_strength_min", gps.initial_signal_strength_min)?;
        unit("gps.initial_signal_strength_max", gps.initial_signal_strength_max)?;
        ordered(
            "gps.initial_signal_strength_max",
            gps.initial_signal_strength_min,
            gps.initial_signal_strength_max,
        )?;
        non_negative("gps.min_accuracy", gps.min_accuracy)?;
        ordered("gps.max_accuracy", gps.min_accuracy, gps.max_accuracy)?;
        unit("gps.min_signal_strength", gps.min_signal_strength)?;
        unit("gps.max_signal_strength", gps.max_signal_strength)?;
        ordered(
            "gps.max_signal_strength",
            gps.min_signal_strength,
            gps.max_signal_strength,
        )?;
        unit("gps.signal_step", gps.signal_step)?;
        non_negative("gps.accuracy_variation", gps.accuracy_variation)?;
        non_negative("gps.jitter_ratio", gps.jitter_ratio)?;
        positive("gps.sampling_distance", gps.sampling_distance)?;
        positive("gps.sampling_interval", gps.sampling_interval)?;
        self.coordinate_system()?;

        let person = &self.person;
        unit("person.deviation_probability", person.deviation_probability)?;
        if !(0.0..90.0).contains(&person.max_deviation_angle) {
            return Err(ConfigError::invalid(
                "person.max_deviation_angle",
                format!("{} is outside [0, 90) degrees", person.max_deviation_angle),
            ));
        }
        positive("person.correction_threshold", person.correction_threshold)?;
        unit("person.correction_factor", person.correction_factor)?;
        PersonProfile::from_config(0, person).validate()?;
        for entry in &self.persons {
            self.resolve(entry).validate()?;
        }

        let traj = &self.trajectory;
        // Values above 1 are legal: a walk that bulges outward encloses more than the source.
        positive("trajectory.area_threshold", traj.area_threshold)?;
        non_negative("trajectory.area_tolerance_min", traj.area_tolerance_min)?;
        ordered(
            "trajectory.area_tolerance_max",
            traj.area_tolerance_min,
            traj.area_tolerance_max,
        )?;

        if self.elevation.provider == ElevationProviderKind::Arcgis
            && !self.elevation.provider_params.contains_key("dem_path_list")
        {
            return Err(ConfigError::Missing("elevation.provider_params.dem_path_list"));
        }

        Ok(())
    }
}

pub(crate) fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must be greater than 0")))
    }
}

pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must not be negative")))
    }
}

pub(crate) fn unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")))
    }
}

pub(crate) fn ordered(field: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min <= max {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{max} is below the minimum {min}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.time_step_seconds() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = SimulationConfig::from_json(
            r#"{ "simulation": { "time_step": 2.0, "max_retries": 4 },
                 "gps": { "time_unit": "minute", "coordinate_system": "local" } }"#,
        )
        .unwrap();

        assert_eq!(config.simulation.max_attempts, 4);
        assert!((config.simulation.tolerance - 1.0).abs() < f64::EPSILON);
        assert!((config.time_step_seconds() - 120.0).abs() < f64::EPSILON);
        assert!((config.gps.sampling_distance - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejects_out_of_range_probability() {
        let err = SimulationConfig::from_json(r#"{ "person": { "deviation_probability": 1.5 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "person.deviation_probability", .. }
        ));
    }

    #[test]
    fn test_rejects_inverted_speed_range() {
        let err = SimulationConfig::from_json(r#"{ "person": { "speed_range": [2.0, 1.0] } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_rejects_zero_attempts_and_unknown_crs() {
        assert!(SimulationConfig::from_json(r#"{ "simulation": { "max_attempts": 0 } }"#).is_err());
        assert!(
            SimulationConfig::from_json(r#"{ "gps": { "coordinate_system": "EPSG:9999" } }"#)
                .is_err()
        );
    }

    #[test]
    fn test_arcgis_provider_requires_dem_paths() {
        let err = SimulationConfig::from_json(r#"{ "elevation": { "provider": "arcgis" } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_numbered_person_overrides_flat_block() {
        let config = SimulationConfig::from_json(
            r#"{ "person": { "speed_range": [0.5, 1.0] },
                 "persons": [ { "number": 2, "max_speed": 1.8, "max_deviation_angle": 12.0 } ] }"#,
        )
        .unwrap();

        let two = config.profile_for(Some(2));
        assert_eq!(two.number, 2);
        assert!((two.max_speed - 1.8).abs() < f64::EPSILON);
        assert!((two.min_speed - 0.5).abs() < f64::EPSILON);
        assert!((two.max_deviation_angle - 12f64.to_radians()).abs() < 1e-12);

        let unknown = config.profile_for(Some(7));
        assert_eq!(unknown.number, 7);
        assert!((unknown.max_speed - 1.0).abs() < f64::EPSILON);

        assert_eq!(config.team().len(), 1);
    }

    #[test]
    fn test_impossible_threshold_is_still_loadable() {
        let config =
            SimulationConfig::from_json(r#"{ "trajectory": { "area_threshold": 1.5 } }"#).unwrap();
        assert!((config.trajectory.area_threshold - 1.5).abs() < f64::EPSILON);
    }
}
