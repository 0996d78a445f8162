//! Signing key helper for the license server.
//!
//! Without arguments, generates a fresh 32-byte seed and prints it with the
//! matching public key. With `--seed`, prints the public key for an
//! existing seed so it can be embedded in the client.

use anyhow::{Context, Result};
use clap::Parser;
use longq_license::{LicenseSigner, generate_seed, key::DEFAULT_KEY_VERSION};
use serde::Serialize;

/// Environment variable the server reads its seed from.
const SEED_ENV: &str = "LICENSE_SIGNING_SEED";

const PUBLIC_KEY_ENV: &str = "PUBLIC_KEY_HEX";

#[derive(Parser)]
#[command(name = "longq-keygen")]
#[command(about = "Generate or inspect a LongQ license signing key")]
struct Args {
    /// Existing hex seed to derive the public key from
    #[arg(long)]
    seed: Option<String>,

    /// Print a JSON object instead of env-style lines
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct KeyMaterial {
    seed_hex: String,
    public_key_hex: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let seed_hex = match args.seed {
        Some(seed) => seed.trim().to_ascii_lowercase(),
        None => hex::encode(generate_seed()),
    };
    let signer = LicenseSigner::from_seed_hex(&seed_hex, DEFAULT_KEY_VERSION)
        .context("Seed must be 64 hex characters")?;

    let material = KeyMaterial {
        seed_hex,
        public_key_hex: signer.public_key_hex(),
    };

    println!("{}", render(&material, args.json)?);
    Ok(())
}

/// Formats key material either as JSON or as lines that can be sourced
/// straight into the server's environment.
fn render(material: &KeyMaterial, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(material)?);
    }
    Ok(format!(
        "{SEED_ENV}={}\n{PUBLIC_KEY_ENV}={}",
        material.seed_hex, material.public_key_hex
    ))
}
