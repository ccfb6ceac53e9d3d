//! Batch driver for the trajectory engine.
//!
//! Reads a feature file, simulates one trajectory per polygon in parallel
//! and writes a GPX track and a text summary per trajectory, plus a
//! `trajectories.json` with one record per written feature.

pub mod cli;
pub mod errors;
pub mod export;
pub mod input;
pub mod naming;
pub mod runner;

pub mod prelude {
    pub use crate::errors::BatchError;
    pub use crate::export::FeatureRecord;
    pub use crate::input::{FeatureInput, load_features, parse_features};
    pub use crate::naming::{KeyedIndexNamer, NamingState, TrajectoryNamer};
    pub use crate::runner::{BatchOptions, BatchReport, BatchRunner, WrittenTrajectory};
}
