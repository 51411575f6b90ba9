//! Genesis file generation.

use anyhow::{Context, Result};
use clap::Parser;
use prefixvm_chain::Genesis;
use std::path::PathBuf;

/// Arguments for the genesis command
#[derive(Parser, Debug)]
pub struct GenesisArgs {
    /// Genesis file path
    #[arg(long, default_value = "genesis.json")]
    pub genesis_file: PathBuf,

    /// Minimum difficulty for mining
    #[arg(long)]
    pub min_difficulty: Option<u64>,

    /// Minimum block cost
    #[arg(long)]
    pub min_block_cost: Option<u64>,

    /// Seconds a fresh claim remains valid
    #[arg(long)]
    pub expiry_time: Option<u64>,
}

/// Write a genesis file, starting from the defaults.
pub fn run(args: GenesisArgs) -> Result<()> {
    let mut genesis = Genesis::default();
    if let Some(min_difficulty) = args.min_difficulty {
        genesis.min_difficulty = min_difficulty;
    }
    if let Some(min_block_cost) = args.min_block_cost {
        genesis.min_block_cost = min_block_cost;
    }
    if let Some(expiry_time) = args.expiry_time {
        genesis.expiry_time = expiry_time;
    }
    genesis.validate().context("invalid genesis parameters")?;

    genesis
        .save_json(&args.genesis_file)
        .with_context(|| format!("writing {}", args.genesis_file.display()))?;
    println!("created genesis and saved to {}", args.genesis_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");

        run(GenesisArgs {
            genesis_file: path.clone(),
            min_difficulty: Some(3),
            min_block_cost: None,
            expiry_time: Some(120),
        })
        .unwrap();

        let loaded = Genesis::load_json(&path).unwrap();
        assert_eq!(loaded.min_difficulty, 3);
        assert_eq!(loaded.expiry_time, 120);
        assert_eq!(loaded.min_block_cost, Genesis::default().min_block_cost);
    }
}
