//! Stipple CLI entry point

use anyhow::Result;
use clap::Parser;

use stipple_cli::{Cli, execute, init_logging};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    execute(cli)
}
