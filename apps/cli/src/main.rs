//! Thyself CLI — local feed harvesting and profile sync.
//!
//! Replays page snapshots through the harvester, serves the bridge relay
//! over stdio, and runs orchestrator passes against the analysis backend.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
