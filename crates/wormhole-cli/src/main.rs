//! Wormhole CLI
//!
//! Retrieve content by ID from the swarm or the paid market.

mod commands;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wormhole_retrieval::RetrievalConfig;

use crate::commands::GetArgs;

#[derive(Parser)]
#[command(name = "wormhole")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory (blocks are kept under <data-dir>/blocks)
    #[arg(long, global = true, env = "WORMHOLE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Market gateway URL
    #[arg(long, global = true, env = "WORMHOLE_MARKET_API")]
    market_api: Option<String>,

    /// Candidate discovery service URL
    #[arg(long, global = true, env = "WORMHOLE_DISCOVERY_ENDPOINT")]
    discovery_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve content by ID
    Get {
        /// Content ID to retrieve
        cid: String,
        /// Network to retrieve from: fil, ipfs or auto
        #[arg(long, default_value = "auto")]
        network: String,
        /// Miners to query (comma-separated, may be repeated)
        #[arg(long)]
        miners: Vec<String>,
        /// Only retrieve the sub-graph at this path
        #[arg(long)]
        selector: Option<String>,
        /// Try miners in the given order instead of ranking them
        #[arg(long)]
        no_sort: bool,
        /// Where to write the content (default: the content ID)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Store a file in the local node and print its content ID
    Add {
        /// File to add
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wormhole=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match RetrievalConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(market_api) = cli.market_api {
        config.market_api = market_api;
    }
    if cli.discovery_endpoint.is_some() {
        config.discovery_endpoint = cli.discovery_endpoint;
    }

    let result = match cli.command {
        Commands::Get {
            cid,
            network,
            miners,
            selector,
            no_sort,
            output,
        } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, cancelling retrieval");
                    on_signal.cancel();
                }
            });

            let args = GetArgs {
                cid,
                network,
                miners,
                selector,
                no_sort,
                output,
            };
            commands::get(config, args, cancel).await
        }
        Commands::Add { file } => commands::add(config, &file).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
