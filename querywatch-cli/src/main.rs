//! ## querywatch
//! **Operational interface for the measurement pipeline**
//!
//! - `run`: start from a configuration file, reload on SIGHUP, stop on Ctrl-C
//! - `check`: validate a configuration and list the units it would start
//! - `simulate`: drive the pipeline with seeded random traffic

use clap::Parser;
use querywatch_telemetry::EventLogger;

mod commands;
mod facts;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    EventLogger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run(args).await,
        Commands::Check(args) => commands::check(args),
        Commands::Simulate(args) => commands::simulate(args),
    }
}
