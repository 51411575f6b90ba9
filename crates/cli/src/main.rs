//! PrefixVM CLI - main entry point.

use clap::Parser;
use std::process;

mod commands;

use commands::Cli;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = commands::run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
