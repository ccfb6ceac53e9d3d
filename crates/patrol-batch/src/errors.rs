use thiserror::Error;
use trajectory::errors::{ConfigError, SimulationError};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GPX error: {0}")]
    Gpx(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Feature {id}: {reason}")]
    InvalidFeature { id: String, reason: String },

    #[error("Feature {id}: {source}")]
    Simulation {
        id: String,
        #[source]
        source: SimulationError,
    },
}
