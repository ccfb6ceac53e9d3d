//! Simulates patrol trajectories for every polygon of a feature file.
//!
//! Run with:
//! ```
//! cargo run -p patrol-batch --bin patrol-sim -- features.json -c patrol.json -o out
//! ```

use clap::Parser;
use patrol_batch::cli::Args;
use patrol_batch::prelude::*;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;
use trajectory::config::SimulationConfig;
use trajectory::terrain::build_provider;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_file(path)?,
        None => SimulationConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate()?;

    let features = load_features(&args.input)?;
    tracing::info!(count = features.len(), input = %args.input.display(), "Loaded features");

    let elevation = build_provider(&config.elevation)?;
    let runner = BatchRunner::new(
        &config,
        elevation,
        Box::new(KeyedIndexNamer::new(args.name_fields.clone())),
    );
    let options = BatchOptions {
        output_dir: args.output.clone(),
        seed: args.seed,
        start_time: args.start_time.unwrap_or_else(OffsetDateTime::now_utc),
        person_number: args.person,
    };

    let report = runner.run(&features, &options)?;

    tracing::info!("Simulation completed!");
    tracing::info!("  Written: {}", report.written.len());
    tracing::info!("  Failed: {}", report.failed.len());
    if let Some(path) = &report.records {
        tracing::info!("  Records: {}", path.display());
    }

    Ok(())
}
