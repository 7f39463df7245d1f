use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rosetta_index::chain::NodeHandles;
use rosetta_index::config::{AppConfig, CliArgs};
use rosetta_index::devnet::Devnet;
use rosetta_index::init_tracing;
use rosetta_index::server::{self, ApiState};
use rosetta_index::service::IndexerService;
use rosetta_index::types::Address;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let cfg = AppConfig::load(&args)?;
    init_tracing(&cfg.log_level);

    std::fs::create_dir_all(&cfg.db_path)
        .with_context(|| format!("failed to create db_path {}", cfg.db_path.display()))?;

    let node = Arc::new(Devnet::new(cfg.devnet.clone()));
    info!(
        genesis = %node.genesis_id(),
        maturity_delay = cfg.devnet.maturity_delay,
        "devnet started"
    );

    let service = Arc::new(
        IndexerService::open(cfg.service_config(), NodeHandles::from_node(node.clone()))
            .context("failed to open indexer service")?,
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let miner = cfg
        .block_interval
        .map(|every| tokio::spawn(auto_mine(node.clone(), cfg.payout_address, every, stop_rx)));

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let state = ApiState { service: service.clone(), timeout: cfg.request_timeout };
    let served = server::run(addr, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown requested");
    })
    .await;

    let _ = stop_tx.send(true);
    if let Some(handle) = miner {
        if let Err(e) = handle.await {
            warn!(error = %e, "auto-miner exited abnormally");
        }
    }
    service.close().context("failed to close indexer service")?;
    info!("indexer service closed");
    served
}

/// Mine one block every `every` until told to stop.
async fn auto_mine(
    node: Arc<Devnet>,
    payout: Address,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        let node = node.clone();
        match tokio::task::spawn_blocking(move || node.mine_block(payout)).await {
            Ok(Ok(block)) => info!(block = %block.id(), txns = block.transactions.len(), "mined block"),
            Ok(Err(e)) => warn!(error = %e, "mining failed"),
            Err(e) => {
                error!(error = %e, "mining task panicked");
                break;
            }
        }
    }
}
