mod cli;
mod error;
mod pipeline;
mod run_artifacts;
mod run_context;
mod tracker_config;
mod video;

use anyhow::Result;
use cli::{Args, Command};
use run_context::{run_bulk, run_report};

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    match args.command {
        Command::Bulk(bulk) => run_bulk(&bulk)?,
        Command::Report(report) => run_report(&report)?,
    }

    Ok(())
}
