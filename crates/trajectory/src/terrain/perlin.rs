//! Synthetic Perlin terrain for runs without a DEM.

use noise::{NoiseFn, Perlin};
use serde::Deserialize;

use super::ElevationProvider;
use crate::errors::ElevationError;

/// `provider_params` of the `custom` provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(super) struct TerrainParams {
    seed: u32,
    base_elevation: f64,
    height_scale: f64,
    frequency: f64,
    octaves: u32,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 0,
            base_elevation: 100.0,
            height_scale: 50.0,
            // Features a few hundred meters across when fed degrees
            frequency: 200.0,
            octaves: 4,
        }
    }
}

/// Fractal Brownian motion over Perlin noise.
///
/// Deterministic for a given seed, so repeated runs see the same hills.
#[derive(Debug, Clone)]
pub struct TerrainElevation {
    perlin: Perlin,
    base_elevation: f64,
    height_scale: f64,
    frequency: f64,
    octaves: u32,
}

impl TerrainElevation {
    pub fn new(seed: u32) -> Self {
        Self::from_params(TerrainParams {
            seed,
            ..TerrainParams::default()
        })
    }

    pub(super) fn from_params(params: TerrainParams) -> Self {
        Self {
            perlin: Perlin::new(params.seed),
            base_elevation: 0.0,
            height_scale: 1.0,
            frequency: 1.0,
            octaves: params.octaves.max(1),
        }
        .with_base_elevation(params.base_elevation)
        .with_height_scale(params.height_scale)
        .with_frequency(params.frequency)
    }

    pub fn with_base_elevation(mut self, elevation: f64) -> Self {
        self.base_elevation = elevation;
        self
    }

    pub fn with_height_scale(mut self, scale: f64) -> Self {
        self.height_scale = scale;
        self
    }

    pub fn with_frequency(mut self, freq: f64) -> Self {
        self.frequency = freq;
        self
    }

    pub fn height_at(&self, lon: f64, lat: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = self.frequency;
        let mut max_amplitude = 0.0;

        for _ in 0..self.octaves {
            total += self.perlin.get([lon * frequency, lat * frequency]) * amplitude;
            max_amplitude += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }

        // total / max_amplitude is in [-1, 1]
        self.base_elevation + total / max_amplitude * self.height_scale
    }
}

impl ElevationProvider for TerrainElevation {
    fn elevation(&self, lon: f64, lat: f64) -> Result<f64, ElevationError> {
        Ok(self.height_at(lon, lat))
    }
}
