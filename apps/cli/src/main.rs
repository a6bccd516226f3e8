//! crawlrelay CLI: launch remote crawl jobs and relay their results to object
//! storage.
//!
//! Every command prints a JSON document on stdout; logs go to stderr.

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
