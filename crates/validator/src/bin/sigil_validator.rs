// Path: crates/validator/src/bin/sigil_validator.rs

//! The `sigil-validator` binary.

use clap::Parser;
use sigil_storage::MemoryStore;
use sigil_validator::config;
use sigil_validator::rpc::JsonRpcChain;
use sigil_validator::wire::{CanonicalActionEncoder, CanonicalLogCodec};
use sigil_validator::Validator;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "sigil-validator", about = "Sigil threshold-signing validator daemon")]
struct Args {
    /// Path to the validator configuration file.
    #[arg(long, default_value = "validator.toml")]
    config: PathBuf,

    /// Disable the Prometheus metrics sink.
    #[arg(long)]
    no_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    sigil_telemetry::init::init_tracing()?;
    if !args.no_metrics {
        let sink = sigil_telemetry::prometheus::install()?;
        sigil_telemetry::sinks::SINK
            .set(sink)
            .map_err(|_| anyhow::anyhow!("metrics sink already installed"))?;
    }

    let daemon = config::load(&args.config)?;
    tracing::info!(
        target: "validator",
        chain_id = daemon.validator.chain_id,
        participants = daemon.validator.participants.len(),
        "configuration loaded"
    );

    let storage = Arc::new(MemoryStore::new());
    let rpc = Arc::new(JsonRpcChain::new(daemon.rpc_url.clone()));
    let codec = Arc::new(CanonicalLogCodec::new(
        daemon.validator.coordinator_address,
        daemon.validator.consensus_address,
    ));
    let encoder = Arc::new(CanonicalActionEncoder::new(daemon.validator.self_address));

    let validator = Validator::new(daemon.validator, storage, rpc, codec, encoder);
    validator.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!(target: "validator", "interrupt received");
    validator.stop().await?;
    Ok(())
}
