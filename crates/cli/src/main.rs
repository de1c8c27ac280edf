//! Entry point for the Umbra CLI.
//!
//! Umbra obfuscates a lowered SSA-IR module through a configurable pass
//! pipeline, optionally tuned by an evolutionary search, and records the
//! emitted artifact's digest on a ledger. This module parses arguments,
//! initializes logging and dispatches to the subcommands.

mod commands;
mod config;
mod frontend;

use clap::Parser;
use commands::Cmd;

/// Command-line interface for Umbra.
#[derive(Parser)]
#[command(name = "umbra")]
#[command(about = "Umbra: SSA-IR obfuscation toolchain")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    cli.command.execute().await
}
