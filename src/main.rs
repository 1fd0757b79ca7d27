//! Reconchain CLI: decode access keys and scan resource descriptions for embedded keys.

use anyhow::Result;
use clap::Parser;
use reconchain::engine::arg_parser::Cli;
use reconchain::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
