use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

use alloy::primitives::B256;
use clap::Parser;
use sparseth_config::{AccountsConfig, ChainSpec, Network};
use sparseth_node::{Node, NodeConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[clap(version, about)]
/// Sparseth is a sparse verifying light node for Ethereum
struct Cli {
    /// RPC provider URL to connect to
    #[clap(long, default_value = "ws://localhost:8545", env = "EXECUTION_RPC_URL")]
    rpc: String,
    /// Path to the database; in-memory when omitted
    #[clap(long, env = "DB_PATH")]
    db: Option<PathBuf>,
    /// Path to the account config file
    #[clap(long, default_value = "config.yaml", env = "CONFIG_PATH")]
    config: PathBuf,
    /// Ethereum network to use
    #[clap(long, default_value = "mainnet", env = "ETHEREUM_NETWORK")]
    network: String,
    /// Checkpoint hash to start from (default: genesis hash of the network)
    #[clap(long, env = "CHECKPOINT_HASH")]
    checkpoint: Option<B256>,
    /// Enable event monitoring mode
    #[clap(long)]
    event_mode: bool,
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()
        .expect("invalid env filter");
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).finish();
    tracing::subscriber::set_global_default(subscriber).expect("subscriber set failed");

    let cli = Cli::parse();
    let event_mode = cli.event_mode
        || matches!(
            std::env::var("EVENT_MODE").as_deref(),
            Ok("1") | Ok("true")
        );

    let network: Network = match cli.network.parse() {
        Ok(network) => network,
        Err(err) => {
            error!(target: "sparseth::runner", %err);
            info!(target: "sparseth::runner", "supported networks: mainnet, sepolia, anvil");
            exit(2);
        }
    };
    let chain = ChainSpec::for_network(network);

    let checkpoint = match cli.checkpoint.or(chain.genesis_hash) {
        Some(checkpoint) => checkpoint,
        // Ephemeral dev chains have no well-known genesis.
        None => {
            error!(
                target: "sparseth::runner",
                "checkpoint option is required for the {network} network"
            );
            exit(2);
        }
    };

    info!(target: "sparseth::runner", url = %cli.rpc, "using RPC provider");
    info!(target: "sparseth::runner", path = ?cli.db, "using database");
    info!(target: "sparseth::runner", %network, "using network");
    info!(target: "sparseth::runner", %checkpoint, "using checkpoint");
    info!(target: "sparseth::runner", path = %cli.config.display(), "using config file");
    info!(target: "sparseth::runner", enabled = event_mode, "event mode");

    let accounts = match load_accounts(&cli.config, event_mode) {
        Ok(accounts) => accounts,
        Err(err) => {
            error!(target: "sparseth::runner", %err, "failed to load config");
            exit(1);
        }
    };

    let config = NodeConfig {
        chain,
        checkpoint,
        accounts: Arc::new(accounts),
        rpc_url: cli.rpc,
        db_path: cli.db,
        event_mode,
    };

    let node = match Node::new(config).await {
        Ok(node) => node,
        Err(err) => {
            error!(target: "sparseth::runner", %err, "failed to create node");
            exit(1);
        }
    };

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    info!(target: "sparseth::runner", "start node");
    match node.run(cancel).await {
        Ok(()) => info!(target: "sparseth::runner", "graceful shutdown"),
        Err(err) => {
            error!(target: "sparseth::runner", %err, "node run failed");
            exit(1);
        }
    }
}

fn load_accounts(path: &PathBuf, event_mode: bool) -> eyre::Result<AccountsConfig> {
    let accounts = AccountsConfig::load(path)?;
    accounts.validate_for_mode(event_mode)?;
    Ok(accounts)
}

// SIGINT and SIGTERM both request a graceful shutdown.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("could not register signal handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        info!(target: "sparseth::runner", "shutting down");
        cancel.cancel();
    });
}
