//! Synthetic GPS patrol trajectories.
//!
//! A person walks the boundary of a polygon, edge by edge, under a stamina
//! and heading-deviation model. A simulated receiver samples the walk with
//! signal-dependent noise. Candidates whose sampled outline covers too little
//! of the polygon are re-walked, partially (backtrack) or from scratch.
//!
//! ```rust,ignore
//! use trajectory::prelude::*;
//!
//! let config = SimulationConfig::from_file("patrol.json")?;
//! let mut sim = TrajectorySimulator::new(&config)
//!     .with_elevation(build_provider(&config.elevation)?)
//!     .with_observer(Box::new(TracingObserver));
//! let trajectory = sim.simulate_feature(&polygon, Some(1), start, &mut rng)?;
//! ```

pub mod config;
pub mod errors;
pub mod geometry;
pub mod gps;
pub mod models;
pub mod observers;
pub mod person;
pub mod projection;
pub mod simulator;
pub mod terrain;
pub mod validator;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::config::{
        CoverageMode, ElevationProviderKind, MovementStrategy, SamplingStrategy, SimulationConfig,
        TimeUnit,
    };
    pub use crate::errors::{
        ConfigError, ElevationError, GeometryError, ObserverError, SimulationError,
    };
    pub use crate::geometry::{Boundary, Segment, plan_route};
    pub use crate::gps::GpsSample;
    pub use crate::models::{Trajectory, TrajectorySummary};
    pub use crate::observers::{CsvObserver, TracingObserver, TrajectoryEvent, TrajectoryObserver};
    pub use crate::person::{PersonProfile, Team};
    pub use crate::projection::CoordinateSystem;
    pub use crate::simulator::TrajectorySimulator;
    pub use crate::terrain::{
        CachedElevation, DemElevation, ElevationProvider, FlatElevation, TerrainElevation,
        build_provider,
    };
    pub use crate::validator::{CoveragePolicy, TrajectoryValidator};
}
