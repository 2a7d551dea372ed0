use std::sync::Arc;

use alloy::consensus::Header;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::dispatcher::Dispatcher;

/// Receives canonical headers from the sync client and fans them out
/// through the dispatcher.
pub struct Listener {
    sub: mpsc::Receiver<Arc<Header>>,
    dispatcher: Arc<Dispatcher>,
}

impl Listener {
    pub fn new(sub: mpsc::Receiver<Arc<Header>>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { sub, dispatcher }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> eyre::Result<()> {
        info!(target: "sparseth::listener", "start listening for block headers");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(target: "sparseth::listener", "stop listening for block headers");
                    return Ok(());
                }
                head = self.sub.recv() => {
                    match head {
                        Some(head) => {
                            info!(
                                target: "sparseth::listener",
                                num = head.number,
                                hash = %head.hash_slow(),
                                "received new block head"
                            );
                            self.dispatcher.broadcast(head);
                        }
                        // Publisher gone: the sync client shut down.
                        None => {
                            info!(target: "sparseth::listener", "header stream closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
