//! Elevation providers.
//!
//! The simulator asks for elevations once per accepted trajectory, through
//! [`ElevationProvider::batch_elevation`]. Providers are shared across
//! parallel runs, hence `Send + Sync`.

mod dem;
mod perlin;

pub use dem::{AsciiGrid, DemElevation};
pub use perlin::TerrainElevation;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{ElevationConfig, ElevationProviderKind};
use crate::errors::{ConfigError, ElevationError};

/// Elevation lookup by WGS84 longitude/latitude.
pub trait ElevationProvider: Send + Sync {
    /// Elevation in meters at one point.
    fn elevation(&self, lon: f64, lat: f64) -> Result<f64, ElevationError>;

    /// Elevations for `points`, in the same order.
    fn batch_elevation(&self, points: &[(f64, f64)]) -> Result<Vec<f64>, ElevationError> {
        points
            .iter()
            .map(|&(lon, lat)| self.elevation(lon, lat))
            .collect()
    }
}

/// Flat terrain at a fixed height.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatElevation {
    pub height: f64,
}

impl ElevationProvider for FlatElevation {
    fn elevation(&self, _lon: f64, _lat: f64) -> Result<f64, ElevationError> {
        Ok(self.height)
    }
}

/// Degrees per cache cell, about one meter at the equator.
pub const DEFAULT_CACHE_RESOLUTION: f64 = 1e-5;
/// Cached cells kept before the cache starts over.
pub const DEFAULT_CACHE_CAPACITY: usize = 1_000_000;

/// Memoizes another provider on a grid of `resolution` degrees. Safe to share
/// between threads.
///
/// Points falling in the same cell share the elevation of the first one
/// looked up. The cache is cleared once it holds `capacity` cells.
pub struct CachedElevation {
    inner: Arc<dyn ElevationProvider>,
    resolution: f64,
    capacity: usize,
    cache: Mutex<HashMap<(i64, i64), f64>>,
}

impl CachedElevation {
    pub fn new(inner: Arc<dyn ElevationProvider>) -> Self {
        Self {
            inner,
            resolution: DEFAULT_CACHE_RESOLUTION,
            capacity: DEFAULT_CACHE_CAPACITY,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_resolution(mut self, degrees: f64) -> Self {
        if degrees > 0.0 {
            self.resolution = degrees;
        }
        self
    }

    pub fn with_capacity(mut self, cells: usize) -> Self {
        self.capacity = cells.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(&self, lon: f64, lat: f64) -> (i64, i64) {
        (
            (lon / self.resolution).round() as i64,
            (lat / self.resolution).round() as i64,
        )
    }

    fn cache(&self) -> Result<MutexGuard<'_, HashMap<(i64, i64), f64>>, ElevationError> {
        self.cache
            .lock()
            .map_err(|_| ElevationError::Backend("elevation cache lock poisoned".to_string()))
    }

    fn store(&self, cache: &mut HashMap<(i64, i64), f64>, key: (i64, i64), value: f64) {
        if cache.len() >= self.capacity && !cache.contains_key(&key) {
            debug!(cells = cache.len(), "Elevation cache full, clearing");
            cache.clear();
        }
        cache.insert(key, value);
    }
}

impl ElevationProvider for CachedElevation {
    fn elevation(&self, lon: f64, lat: f64) -> Result<f64, ElevationError> {
        let key = self.key(lon, lat);
        if let Some(&hit) = self.cache()?.get(&key) {
            return Ok(hit);
        }
        let value = self.inner.elevation(lon, lat)?;
        self.store(&mut *self.cache()?, key, value);
        Ok(value)
    }

    fn batch_elevation(&self, points: &[(f64, f64)]) -> Result<Vec<f64>, ElevationError> {
        let keys: Vec<(i64, i64)> = points.iter().map(|&(lon, lat)| self.key(lon, lat)).collect();
        let mut values: Vec<Option<f64>> = {
            let cache = self.cache()?;
            keys.iter().map(|k| cache.get(k).copied()).collect()
        };

        let misses: Vec<(f64, f64)> = points
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_none())
            .map(|(&p, _)| p)
            .collect();
        if !misses.is_empty() {
            let fetched = self.inner.batch_elevation(&misses)?;
            if fetched.len() != misses.len() {
                return Err(ElevationError::Backend(format!(
                    "expected {} elevations, got {}",
                    misses.len(),
                    fetched.len()
                )));
            }
            let mut cache = self.cache()?;
            let open = values.iter_mut().zip(&keys).filter(|(v, _)| v.is_none());
            for ((slot, &key), value) in open.zip(fetched) {
                *slot = Some(value);
                self.store(&mut cache, key, value);
            }
        }

        Ok(values.into_iter().flatten().collect())
    }
}

#[derive(Debug, Deserialize)]
struct DemParams {
    dem_path_list: Vec<std::path::PathBuf>,
}

/// Builds the provider selected by `elevation.provider`.
pub fn build_provider(config: &ElevationConfig) -> Result<Arc<dyn ElevationProvider>, ConfigError> {
    let provider: Arc<dyn ElevationProvider> = match config.provider {
        ElevationProviderKind::Default => Arc::new(FlatElevation::default()),
        ElevationProviderKind::Custom => {
            Arc::new(TerrainElevation::from_params(params(config)?))
        }
        ElevationProviderKind::Arcgis => {
            let dem: DemParams = params(config)?;
            let grids = DemElevation::open(&dem.dem_path_list).map_err(|e| {
                ConfigError::invalid("elevation.provider_params.dem_path_list", e.to_string())
            })?;
            Arc::new(CachedElevation::new(Arc::new(grids)))
        }
    };
    Ok(provider)
}

fn params<T: DeserializeOwned>(config: &ElevationConfig) -> Result<T, ConfigError> {
    Ok(serde_json::from_value(serde_json::Value::Object(
        config.provider_params.clone(),
    ))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl ElevationProvider for Counting {
        fn elevation(&self, lon: f64, lat: f64) -> Result<f64, ElevationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(lon + lat)
        }
    }

    #[test]
    fn test_default_batch_preserves_order() {
        let provider = Counting {
            calls: AtomicUsize::new(0),
        };
        let values = provider
            .batch_elevation(&[(1.0, 2.0), (10.0, 20.0), (0.5, 0.5)])
            .unwrap();
        assert_eq!(values, vec![3.0, 30.0, 1.0]);
    }

    #[test]
    fn test_cache_avoids_repeat_lookups() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedElevation::new(inner.clone());

        cached.batch_elevation(&[(1.0, 1.0), (2.0, 2.0)]).unwrap();
        let again = cached.batch_elevation(&[(2.0, 2.0), (3.0, 3.0), (1.0, 1.0)]).unwrap();

        assert_eq!(again, vec![4.0, 6.0, 2.0]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cached.elevation(3.0, 3.0).unwrap(), 6.0);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cached.len(), 3);
    }

    #[test]
    fn test_cache_hits_nearby_points() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedElevation::new(inner.clone());

        // Two patrols of the same corner, a few centimeters apart
        let first = cached
            .batch_elevation(&[(120.000_001, 30.000_002), (120.001, 30.0)])
            .unwrap();
        let second = cached
            .batch_elevation(&[(120.000_003, 30.000_001), (120.002, 30.0), (120.001_001, 30.000_002)])
            .unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(second[0], first[0]);
        assert_eq!(second[2], first[1]);
        assert_eq!(cached.len(), 3);
    }

    #[test]
    fn test_cache_is_bounded() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedElevation::new(inner.clone())
            .with_resolution(1.0)
            .with_capacity(4);

        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 0.0)).collect();
        let values = cached.batch_elevation(&points).unwrap();

        assert_eq!(values, (0..10).map(|i| i as f64).collect::<Vec<_>>());
        assert!(cached.len() <= 4);
        assert_eq!(cached.elevation(9.0, 0.0).unwrap(), 9.0);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_build_default_and_custom() {
        let flat = build_provider(&ElevationConfig::default()).unwrap();
        assert_eq!(flat.elevation(120.0, 30.0).unwrap(), 0.0);

        let config: ElevationConfig = serde_json::from_str(
            r#"{ "provider": "custom", "provider_params": { "seed": 3, "base_elevation": 200.0 } }"#,
        )
        .unwrap();
        let terrain = build_provider(&config).unwrap();
        let h = terrain.elevation(120.0, 30.0).unwrap();
        assert!(h > 0.0 && h < 400.0);
    }

    #[test]
    fn test_build_raster_with_missing_file() {
        let config: ElevationConfig = serde_json::from_str(
            r#"{ "provider": "raster", "provider_params": { "dem_path_list": ["/nonexistent/dem.asc"] } }"#,
        )
        .unwrap();
        assert!(matches!(
            build_provider(&config),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
