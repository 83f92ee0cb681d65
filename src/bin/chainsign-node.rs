#![forbid(unsafe_code)]
//! ChainSign API server: ledger + HTTP surface in one process.

use std::sync::Arc;

use chainsign::api::{run_api_server, ApiState};
use chainsign::cli::{init_tracing, load_ledger_from_config};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chainsign-node", about = "Serve the ChainSign ledger over HTTP")]
struct Args {
    /// Port to listen on (overrides config and PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let (config, ledger) = load_ledger_from_config()?;
    let ledger = Arc::new(ledger);
    let port = args.port.unwrap_or(config.api.port);

    info!(
        difficulty = ledger.difficulty(),
        durable = ledger.is_durable(),
        blocks = ledger.get_chain().len(),
        "Starting ChainSign node"
    );

    let state = ApiState::new(ledger.clone()).with_static_dir(config.api.static_dir.clone());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown requested");
    };

    run_api_server(state, port, shutdown).await?;

    if let Err(e) = ledger.flush().await {
        error!("Failed to flush ledger on shutdown: {}", e);
    }
    info!("ChainSign node stopped");
    Ok(())
}
