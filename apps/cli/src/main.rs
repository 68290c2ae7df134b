//! ContentBridge CLI: import external HTML into a local content store and export it back.
//!
//! Imports render to flat HTML or a block-tree document, with remote images
//! pulled into the store's media library inline or through a background queue.

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
