//! Node assembly: wires the sync client, the block listener and the
//! monitors together under a shared cancellation token.

use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::B256;
use eyre::WrapErr;
use sparseth_chainstore::EventStore;
use sparseth_config::{AccountsConfig, ChainSpec};
use sparseth_execution::event::LogProcessor;
use sparseth_execution::rpc::HttpRpc;
use sparseth_execution::state::TxProcessor;
use sparseth_execution::{Dispatcher, Listener, Monitor, Provider};
use sparseth_storage::{KeyValueStore, MemoryStore, RocksStore};
use sparseth_sync::SyncClient;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Everything the node needs to start.
pub struct NodeConfig {
    pub chain: ChainSpec,
    /// Block hash the sync client anchors its back-fill at.
    pub checkpoint: B256,
    pub accounts: Arc<AccountsConfig>,
    pub rpc_url: String,
    /// On-disk database location; in-memory when unset.
    pub db_path: Option<PathBuf>,
    pub event_mode: bool,
}

/// Coordinator of the node's subsystems.
pub struct Node {
    config: NodeConfig,
    rpc: Arc<HttpRpc>,
    db: Arc<dyn KeyValueStore>,
    dispatcher: Arc<Dispatcher>,
}

impl Node {
    pub async fn new(config: NodeConfig) -> eyre::Result<Self> {
        let rpc = Arc::new(
            HttpRpc::connect(&config.rpc_url)
                .await
                .wrap_err("could not connect to RPC provider")?,
        );

        let db: Arc<dyn KeyValueStore> = match &config.db_path {
            Some(path) => Arc::new(RocksStore::open(path).wrap_err("could not open database")?),
            None => Arc::new(MemoryStore::new()),
        };

        Ok(Self {
            config,
            rpc,
            db,
            dispatcher: Arc::new(Dispatcher::new()),
        })
    }

    /// Runs all task families until completion or cancellation. The first
    /// fatal task error cancels the group.
    pub async fn run(self, cancel: CancellationToken) -> eyre::Result<()> {
        let mut tasks = JoinSet::new();

        let (sync_client, pipe) =
            SyncClient::new(self.rpc.clone(), self.db.clone(), self.config.checkpoint);
        let listener = Listener::new(pipe, self.dispatcher.clone());

        if self.config.event_mode {
            // One log monitor per event-enabled contract account.
            for account in &self.config.accounts.accounts {
                if account.event.is_none() {
                    continue;
                }
                info!(target: "sparseth::node", account = %account.address, "start event monitor");

                let id = account.address.to_string();
                let sub = self.dispatcher.subscribe(&id);
                let processor = LogProcessor::new(
                    account,
                    Provider::new(self.rpc.clone()),
                    EventStore::new(self.db.clone()),
                )?;
                let monitor = Monitor::new(format!("{id}-event"), sub, processor);
                tasks.spawn(monitor.run(cancel.clone()));
            }
        } else {
            // A single transaction monitor serves all monitored accounts.
            info!(target: "sparseth::node", "start transaction monitor");
            let sub = self.dispatcher.subscribe("transaction-monitor");
            let processor = TxProcessor::new(
                self.config.accounts.clone(),
                self.config.chain.clone(),
                self.db.clone(),
                self.rpc.clone(),
            );
            let monitor = Monitor::new("transaction", sub, processor);
            tasks.spawn(monitor.run(cancel.clone()));
        }

        info!(target: "sparseth::node", "start block listener");
        tasks.spawn(listener.run(cancel.clone()));

        info!(target: "sparseth::node", "start sync client");
        tasks.spawn(sync_client.run(cancel.clone()));

        // Supervise: any fatal error cancels the whole group.
        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(target: "sparseth::node", %err, "task failed");
                    cancel.cancel();
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
                Err(join_err) => {
                    error!(target: "sparseth::node", err = %join_err, "task panicked");
                    cancel.cancel();
                    if result.is_ok() {
                        result = Err(eyre::Report::new(join_err));
                    }
                }
            }
        }

        self.shutdown();
        result
    }

    fn shutdown(&self) {
        info!(target: "sparseth::node", "shut down");
        self.dispatcher.close();
        if let Err(err) = self.db.close() {
            error!(target: "sparseth::node", %err, "failed to close database");
        }
    }
}
