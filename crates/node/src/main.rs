// Path: crates/node/src/main.rs
#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use orc_consensus::{OrchestratorService, ReconciliationEngine};
use orc_storage::RedbShardStore;
use orc_types::config::OrchestratorConfig;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[clap(
    name = "orchestrator",
    about = "Reconciles the Pandora and Vanguard chains into a verified shard chain."
)]
struct OrchestratorOpts {
    #[clap(long, help = "Path to the orchestrator.toml configuration file.")]
    config: Option<PathBuf>,

    #[clap(
        long,
        env = "ORC_DATADIR",
        default_value = "orchestrator-data",
        help = "Directory holding the verified shard store."
    )]
    datadir: PathBuf,
}

fn load_config(opts: &OrchestratorOpts) -> Result<OrchestratorConfig> {
    match &opts.config {
        None => Ok(OrchestratorConfig::default()),
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    orc_telemetry::init_tracing()?;
    let opts = OrchestratorOpts::parse();
    let config = load_config(&opts)?;

    fs::create_dir_all(&opts.datadir)
        .with_context(|| format!("failed to create datadir {}", opts.datadir.display()))?;
    let store = Arc::new(RedbShardStore::open(opts.datadir.join("orchestrator.redb"))?);
    let engine = Arc::new(ReconciliationEngine::new(config.clone(), store));
    let service = OrchestratorService::new(engine.clone(), &config);

    // The subscription clients (execution and consensus RPC transports) push
    // their events through these senders; both stay open for the lifetime of
    // the process.
    let (pan_tx, pan_rx) = mpsc::channel(10_000);
    let (van_tx, van_rx) = mpsc::channel(10_000);

    let mut confirmations = engine.subscribe();
    let confirmation_logger = tokio::spawn(async move {
        loop {
            match confirmations.recv().await {
                Ok(c) => info!(target: "node",
                    pan_hash = %c.pandora_header_hash,
                    van_root = %c.vanguard_block_hash,
                    status = %c.status,
                    "Block confirmation"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: "node", skipped, "Confirmation logger lagged behind the feed")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    service.start(pan_rx, van_rx).await;
    info!(target: "node",
        genesis_time = config.genesis_time,
        seconds_per_slot = config.seconds_per_slot,
        "Orchestrator running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!(target: "node", "Shutting down");
    drop(pan_tx);
    drop(van_tx);
    service.stop().await;
    confirmation_logger.abort();
    Ok(())
}
