//! Key management commands.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prefixvm_crypto::PrivateKey;
use std::fs;
use std::path::PathBuf;

/// Key management subcommands
#[derive(Subcommand, Debug)]
pub enum KeysCommands {
    /// Generate a new secp256k1 keypair
    Generate(GenerateArgs),

    /// Show the public key of a stored private key
    Show(ShowArgs),
}

/// Arguments for key generation
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Output file path for the hex-encoded private key
    #[arg(short, long, default_value = "prefixvm.key")]
    pub output: PathBuf,
}

/// Arguments for showing a key
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Path to the hex-encoded private key file
    #[arg(short, long, default_value = "prefixvm.key")]
    pub key_file: PathBuf,
}

/// Dispatch a keys subcommand.
pub fn run(cmd: KeysCommands) -> Result<()> {
    match cmd {
        KeysCommands::Generate(args) => generate(args),
        KeysCommands::Show(args) => show(args),
    }
}

fn generate(args: GenerateArgs) -> Result<()> {
    if args.output.exists() {
        anyhow::bail!("refusing to overwrite {}", args.output.display());
    }
    let key = PrivateKey::random();
    fs::write(&args.output, key.to_hex())
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!("created key and saved to {}", args.output.display());
    println!("public key: {}", key.public_key().to_hex());
    Ok(())
}

fn show(args: ShowArgs) -> Result<()> {
    let hex = fs::read_to_string(&args.key_file)
        .with_context(|| format!("reading {}", args.key_file.display()))?;
    let key = PrivateKey::from_hex(hex.trim()).context("parsing private key")?;
    println!("public key: {}", key.public_key().to_hex());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_then_show() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.key");

        generate(GenerateArgs {
            output: path.clone(),
        })
        .unwrap();

        show(ShowArgs {
            key_file: path.clone(),
        })
        .unwrap();

        // Refuses to clobber an existing key.
        assert!(generate(GenerateArgs { output: path }).is_err());
    }
}
