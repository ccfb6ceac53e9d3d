use std::path::PathBuf;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use trajectory::config::{MovementStrategy, SamplingStrategy, SimulationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Strategy {
    Realistic,
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Sampling {
    Distance,
    Time,
    Hybrid,
}

#[derive(Debug, clap::Parser)]
#[command(name = "patrol-sim", about = "Simulate GPS patrol trajectories around polygons")]
pub struct Args {
    /// Path to the simulation config (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Path to the feature file (JSON array of rings)
    pub input: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "output")]
    pub output: PathBuf,
    /// Base seed; feature `i` uses `seed + i`
    #[arg(short, long, default_value_t = 42)]
    pub seed: u64,
    /// Feature fields that make up output names
    #[arg(long, value_delimiter = ',')]
    pub name_fields: Vec<String>,
    /// Walk every feature with this person
    #[arg(short, long)]
    pub person: Option<u32>,
    /// Movement strategy override
    #[arg(value_enum, long)]
    pub strategy: Option<Strategy>,
    /// Sampling strategy override
    #[arg(value_enum, long)]
    pub sampling: Option<Sampling>,
    /// Start time for features without one (RFC 3339), defaults to now
    #[arg(long, value_parser = parse_time)]
    pub start_time: Option<OffsetDateTime>,
}

impl Args {
    /// Applies command line overrides on top of the loaded config.
    pub fn apply_overrides(&self, config: &mut SimulationConfig) {
        if let Some(strategy) = self.strategy {
            config.person.movement_strategy = match strategy {
                Strategy::Realistic => MovementStrategy::Realistic,
                Strategy::Simple => MovementStrategy::Simple,
            };
        }
        if let Some(sampling) = self.sampling {
            config.gps.sampling_strategy = match sampling {
                Sampling::Distance => SamplingStrategy::Distance,
                Sampling::Time => SamplingStrategy::Time,
                Sampling::Hybrid => SamplingStrategy::Hybrid,
            };
        }
    }
}

fn parse_time(value: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|e| format!("invalid RFC 3339 time: {e}"))
}
