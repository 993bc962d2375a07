#![recursion_limit = "256"]

mod application;
mod callbacks;
mod cli;
mod config;
mod data;
mod domain;
mod infra;
mod ml;
mod registry;

use anyhow::Result;
use clap::Parser;
use cli::Cli;

fn main() -> Result<()> {
    infra::logging::init_global()?;

    let cli = Cli::parse();
    cli.run()
}
