//! tilepyramid - headless driver for the slippy-map tile engine.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tilepyramid::logging::init_logging;

use commands::common::load_config;
use commands::geodesic::{DirectArgs, InverseArgs};
use commands::locate::LocateArgs;
use commands::view::ViewArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "tilepyramid", version = tilepyramid::VERSION, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve the tiles of a viewport for a while and report what was loaded
    View(ViewArgs),
    /// Show the tile, pixel, storage path and URL for a coordinate
    Locate(LocateArgs),
    /// Distance and azimuths between two points on the WGS84 ellipsoid
    Inverse(InverseArgs),
    /// Destination reached from a point along an azimuth
    Direct(DirectArgs),
    /// List the configured maps
    Maps,
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Inverse(args) => commands::geodesic::run_inverse(args),
        Command::Direct(args) => commands::geodesic::run_direct(args),
        command => {
            let config = load_config(cli.config.as_deref())?;
            let level = cli.log_level.as_deref().unwrap_or(config.logging.level.as_str());
            let _guard = init_logging(level, config.logging.file.as_deref())?;
            match command {
                Command::View(args) => commands::view::run(args, config),
                Command::Locate(args) => commands::locate::run(args, &config),
                Command::Maps => commands::maps::run(&config),
                Command::Inverse(_) | Command::Direct(_) => Ok(()),
            }
        }
    }
}
