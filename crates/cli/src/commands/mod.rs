//! CLI command definitions and handlers.

pub mod genesis;
pub mod keys;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// PrefixVM - a name-prefix claim registry blockchain
#[derive(Parser, Debug)]
#[command(name = "prefixvm")]
#[command(version)]
#[command(about = "PrefixVM command-line tools", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a genesis file in the default location
    Genesis(genesis::GenesisArgs),

    /// Key management commands
    #[command(subcommand)]
    Keys(keys::KeysCommands),
}

/// Dispatch a parsed command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Genesis(args) => genesis::run(args),
        Commands::Keys(cmd) => keys::run(cmd),
    }
}
