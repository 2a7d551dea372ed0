//! Maintains the set of trusted canonical headers.
//!
//! Headers are trusted as delivered by the configured RPC endpoint; this
//! is deliberately the only such trust surface in the node, so replacing
//! it with a verifying light-client protocol is a drop-in.

use std::sync::Arc;

use alloy::consensus::Header;
use alloy::primitives::B256;
use eyre::{eyre, WrapErr};
use futures::StreamExt;
use sparseth_chainstore::HeaderStore;
use sparseth_execution::rpc::ExecutionRpc;
use sparseth_storage::KeyValueStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PUBLISH_BUFFER: usize = 128;

/// Pulls canonical headers from the RPC endpoint, persists them and
/// publishes them towards the dispatcher.
///
/// Start-up first back-fills header by number from the configured
/// checkpoint to the current tip, then follows new heads via the
/// endpoint's subscription. The back-fill restarts from the checkpoint on
/// every boot; anchoring it at the last verified header instead is a
/// deliberate extension point.
pub struct SyncClient<R: ExecutionRpc> {
    rpc: Arc<R>,
    store: HeaderStore,
    publisher: mpsc::Sender<Arc<Header>>,
    checkpoint: B256,
}

impl<R: ExecutionRpc> SyncClient<R> {
    /// Creates the client and the header stream it publishes to.
    pub fn new(
        rpc: Arc<R>,
        db: Arc<dyn KeyValueStore>,
        checkpoint: B256,
    ) -> (Self, mpsc::Receiver<Arc<Header>>) {
        let (publisher, pipe) = mpsc::channel(PUBLISH_BUFFER);
        let client = Self {
            rpc,
            store: HeaderStore::new(db),
            publisher,
            checkpoint,
        };
        (client, pipe)
    }

    pub async fn run(self, cancel: CancellationToken) -> eyre::Result<()> {
        let latest = self.rpc.get_latest_header().await?;
        info!(
            target: "sparseth::sync",
            num = latest.number,
            hash = %latest.hash_slow(),
            "latest block"
        );

        info!(target: "sparseth::sync", "start sync up");
        self.back_fill(&cancel, latest.number).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }
        info!(target: "sparseth::sync", "sync up finished");

        self.follow(cancel).await
    }

    // Walks header by number from the checkpoint up to the tip.
    async fn back_fill(&self, cancel: &CancellationToken, tip: u64) -> eyre::Result<()> {
        let start = self
            .rpc
            .get_header_by_hash(self.checkpoint)
            .await
            .wrap_err("failed to fetch checkpoint header")?;

        let first = start.number;
        self.publish(start).await?;

        for num in first + 1..=tip {
            if cancel.is_cancelled() {
                return Ok(());
            }

            debug!(target: "sparseth::sync", num, "download block header");
            let head = self
                .rpc
                .get_header_by_number(num)
                .await
                .wrap_err_with(|| format!("failed to fetch header at block {num}"))?;
            self.publish(head).await?;
        }

        Ok(())
    }

    // Follows the endpoint's new-head subscription.
    async fn follow(&self, cancel: CancellationToken) -> eyre::Result<()> {
        info!(target: "sparseth::sync", "start new block sync");
        let mut heads = self.rpc.subscribe_headers().await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(target: "sparseth::sync", "stop block sync");
                    return Ok(());
                }
                head = heads.next() => {
                    match head {
                        Some(head) => {
                            info!(
                                target: "sparseth::sync",
                                num = head.number,
                                hash = %head.hash_slow(),
                                "got new head"
                            );
                            if let Err(err) = self.publish(head).await {
                                warn!(target: "sparseth::sync", %err, "failed to publish head");
                                return Ok(());
                            }
                        }
                        None => return Err(eyre!("header subscription ended")),
                    }
                }
            }
        }
    }

    // Persists the header and hands it to the listener. A closed pipe
    // means the node is shutting down.
    async fn publish(&self, head: Header) -> eyre::Result<()> {
        self.store.put(&head)?;
        self.publisher
            .send(Arc::new(head))
            .await
            .map_err(|_| eyre!("header pipe closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparseth_execution::rpc::mock_rpc::MockRpc;
    use sparseth_storage::MemoryStore;

    fn chain(len: u64) -> Vec<Header> {
        let mut headers = Vec::new();
        let mut parent = B256::ZERO;
        for num in 0..len {
            let header = Header {
                number: num,
                parent_hash: parent,
                ..Default::default()
            };
            parent = header.hash_slow();
            headers.push(header);
        }
        headers
    }

    #[tokio::test]
    async fn back_fills_from_checkpoint_to_tip() {
        let headers = chain(4);
        let rpc = MockRpc::new(1);
        for header in &headers {
            rpc.add_header(header.clone());
        }

        let db = Arc::new(MemoryStore::new());
        let checkpoint = headers[0].hash_slow();
        let (client, mut pipe) = SyncClient::new(Arc::new(rpc), db.clone(), checkpoint);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(client.run(cancel.clone()));

        for expected in 0..4u64 {
            let head = pipe.recv().await.unwrap();
            assert_eq!(head.number, expected);
        }

        // Everything published is also in the store.
        let store = HeaderStore::new(db);
        for expected in 0..4u64 {
            assert_eq!(store.get_by_number(expected).unwrap().number, expected);
        }

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn back_fill_starts_at_non_genesis_checkpoint() {
        let headers = chain(5);
        let rpc = MockRpc::new(1);
        for header in &headers {
            rpc.add_header(header.clone());
        }

        let db = Arc::new(MemoryStore::new());
        let checkpoint = headers[2].hash_slow();
        let (client, mut pipe) = SyncClient::new(Arc::new(rpc), db, checkpoint);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(client.run(cancel.clone()));

        for expected in 2..5u64 {
            assert_eq!(pipe.recv().await.unwrap().number, expected);
        }

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn follows_new_heads_after_sync_up() {
        let headers = chain(2);
        let rpc = MockRpc::new(1);
        for header in &headers {
            rpc.add_header(header.clone());
        }

        let new_head = Header {
            number: 2,
            parent_hash: headers[1].hash_slow(),
            ..Default::default()
        };
        rpc.add_new_head(new_head.clone());

        let db = Arc::new(MemoryStore::new());
        let checkpoint = headers[0].hash_slow();
        let (client, mut pipe) = SyncClient::new(Arc::new(rpc), db.clone(), checkpoint);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(client.run(cancel.clone()));

        assert_eq!(pipe.recv().await.unwrap().number, 0);
        assert_eq!(pipe.recv().await.unwrap().number, 1);
        assert_eq!(pipe.recv().await.unwrap().number, 2);

        let store = HeaderStore::new(db);
        assert_eq!(store.get_by_number(2).unwrap(), new_head);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_checkpoint_is_an_error() {
        let headers = chain(2);
        let rpc = MockRpc::new(1);
        for header in &headers {
            rpc.add_header(header.clone());
        }

        let db = Arc::new(MemoryStore::new());
        let (client, _pipe) = SyncClient::new(Arc::new(rpc), db, B256::repeat_byte(0xff));

        assert!(client.run(CancellationToken::new()).await.is_err());
    }
}
