use thiserror::Error;

/// A polygon that cannot be walked.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Polygon has {0} distinct vertices, at least 3 are required")]
    TooFewVertices(usize),

    #[error("Polygon vertex {0} has a non-finite coordinate")]
    NonFinite(usize),

    #[error("Polygon encloses no area")]
    ZeroArea,

    #[error("Polygon boundary intersects itself at edges {0} and {1}")]
    SelfIntersecting(usize, usize),
}

/// An out-of-range, missing or unreadable configuration value.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Missing required parameter {0}")]
    Missing(&'static str),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Failures of a single `simulate` call.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Invalid geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(
        "Coverage not reached after {attempts} attempts (last area ratio {last_area_ratio:.4}, {rejected_segments} rejected segments)"
    )]
    Failed {
        attempts: u32,
        last_area_ratio: f64,
        rejected_segments: usize,
    },
}

/// Elevation backend failures. Recoverable: the trajectory is kept without elevations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElevationError {
    #[error("IO error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("Malformed elevation grid {path}: {message}")]
    Grid { path: String, message: String },

    #[error("Elevation lookup timed out after {0} ms")]
    Timeout(u64),

    #[error("Elevation backend error: {0}")]
    Backend(String),
}

/// A single observer's handler failed.
#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Observer error: {0}")]
    Other(String),
}
