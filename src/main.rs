//! orbitwatch - conjunction risk analysis and collision alert monitoring
//!
//! Reads element sets from a TLE catalog dump and conjunction assessments
//! from a CDM JSON dump; every command writes JSON to stdout.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    DensityArgs, HotspotArgs, MonitorArgs, PassArgs, ProximityArgs, RiskArgs, TcaArgs, TrackArgs,
    VisibilityArgs,
};

#[derive(Parser, Debug)]
#[command(name = "orbitwatch", version)]
#[command(about = "Orbit propagation, conjunction risk and collision alerting", long_about = None)]
struct Cli {
    /// TLE catalog file (two- or three-line format, optionally .gz)
    #[arg(long, global = true, env = "ORBITWATCH_TLE")]
    tle: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Risk of one object against its altitude neighbors
    Risk(RiskArgs),
    /// Time of closest approach between two objects
    Tca(TcaArgs),
    /// Object density in an altitude shell
    Density(DensityArgs),
    /// Object counts per altitude band
    Distribution,
    /// Densest latitude/altitude cells
    Hotspots(HotspotArgs),
    /// Ground track of one object
    Track(TrackArgs),
    /// Occupancy and altitude spread of the Starlink shells
    Health,
    /// Instantaneous close pairs across the catalog
    Proximity(ProximityArgs),
    /// Upcoming passes of one object over a ground station
    Passes(PassArgs),
    /// Ground stations currently in view of one object
    Visibility(VisibilityArgs),
    /// Hysteresis-gated collision alert monitoring
    Monitor(MonitorArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let tle = cli.tle.as_deref();

    match cli.command {
        Command::Risk(args) => commands::run_risk(tle, args).await,
        Command::Tca(args) => commands::run_tca(tle, args).await,
        Command::Density(args) => commands::run_density(tle, args).await,
        Command::Distribution => commands::run_distribution(tle).await,
        Command::Hotspots(args) => commands::run_hotspots(tle, args).await,
        Command::Track(args) => commands::run_track(tle, args).await,
        Command::Health => commands::run_health(tle).await,
        Command::Proximity(args) => commands::run_proximity(tle, args).await,
        Command::Passes(args) => commands::run_passes(tle, args).await,
        Command::Visibility(args) => commands::run_visibility(tle, args).await,
        Command::Monitor(args) => commands::run_monitor(args).await,
    }
}
