//! Entry point: parses the CLI, initialises tracing, and hands over to
//! `run.rs`, which resolves the demo settings and either opens the window or
//! captures a still frame.

mod cli;
mod run;

use anyhow::Result;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();
    run::run(cli.run)
}
