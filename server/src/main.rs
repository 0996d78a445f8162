//! LongQ License Issuance Server
//!
//! Mints signed, device-bound licenses for allowlisted purchasers:
//! 1. Checks the purchaser's email against the allowlist
//! 2. Replays the existing license for a known (email, device) pair
//! 3. Enforces the per-email seat quota and signs new licenses
//!
//! Usage:
//!   LICENSE_SIGNING_SEED=<64 hex> longq-license-server --port 8787 --allowlist allow.json
//!
//! State is held in an in-process store; point the issuer at a shared
//! key-value backend for multi-instance deployments.

use anyhow::{Context, Result};
use clap::Parser;
use longq_license::{IssuerConfig, KvStore, LicenseIssuer, MemoryStore};
use longq_license_server::{build_router, load_allowlist_file};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "longq-license-server")]
#[command(about = "LongQ license issuance service")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, env = "LICENSE_PORT", default_value = "8787")]
    port: u16,

    /// Address to bind
    #[arg(long, env = "LICENSE_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Hex-encoded 32-byte Ed25519 signing seed
    #[arg(long, env = "LICENSE_SIGNING_SEED", hide_env_values = true)]
    signing_seed: Option<String>,

    /// Key version stamped into issued licenses
    #[arg(long, env = "LICENSE_KEY_VERSION", default_value = "1")]
    key_version: u32,

    /// JSON file mapping emails to seat quotas, loaded at startup
    #[arg(long, env = "LICENSE_ALLOWLIST")]
    allowlist: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("LongQ license server starting...");

    let store = MemoryStore::new();
    if let Some(path) = &args.allowlist {
        load_allowlist_file(&store as &dyn KvStore, path).await?;
    } else {
        warn!("No allowlist file given; every issuance will be refused");
    }

    let config = IssuerConfig {
        signing_seed: args.signing_seed.clone(),
        key_version: Some(args.key_version),
    };
    let issuer = Arc::new(LicenseIssuer::from_config(Arc::new(store), &config));
    let public_key = issuer.public_key_hex();

    let app = build_router(Arc::clone(&issuer));
    let addr = format!("{}:{}", args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    println!("\n========================================");
    println!("  LongQ License Server Running");
    println!("========================================");
    println!("  Listen:      {}", addr);
    println!("  Key version: {}", args.key_version);
    match &public_key {
        Some(pk) => println!("  Public key:  {}", pk),
        None => println!("  Public key:  (none, signing disabled)"),
    }
    println!("========================================\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("LongQ license server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
