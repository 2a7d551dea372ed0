use alloy::consensus::Header;
use async_trait::async_trait;
use sparseth_chainstore::ChainStoreError;
use sparseth_storage::StoreError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::dispatcher::Subscription;
use crate::state::{PrepareError, StateError, VerifyError};

/// Per-block business logic driven by a [`Monitor`]: the event-mode log
/// processor and the sparse-mode transaction processor.
#[async_trait]
pub trait Processor: Send {
    /// Handles a single canonical block header. Called exactly once per
    /// delivered header, in delivery order.
    async fn process_block(&mut self, header: &Header) -> eyre::Result<()>;
}

/// Binds a dispatcher subscription to a [`Processor`].
///
/// A block is fully processed (or its failure logged) before the next one
/// is pulled. Per-block failures are not fatal and the monitor continues
/// with the next header; store-consistency failures terminate the monitor.
pub struct Monitor<P: Processor> {
    name: String,
    sub: Subscription,
    processor: P,
}

impl<P: Processor> Monitor<P> {
    pub fn new(name: impl Into<String>, sub: Subscription, processor: P) -> Self {
        Self {
            name: name.into(),
            sub,
            processor,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> eyre::Result<()> {
        info!(target: "sparseth::monitor", monitor = %self.name, "start monitor");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(target: "sparseth::monitor", monitor = %self.name, "stop monitor");
                    return Ok(());
                }
                head = self.sub.recv() => {
                    let Some(head) = head else {
                        info!(target: "sparseth::monitor", monitor = %self.name, "subscription closed");
                        return Ok(());
                    };

                    let num = head.number;
                    let hash = head.hash_slow();
                    match self.processor.process_block(&head).await {
                        Ok(()) => {
                            info!(
                                target: "sparseth::monitor",
                                monitor = %self.name,
                                num,
                                %hash,
                                "block verified"
                            );
                        }
                        // Store-consistency failures mean the node can no
                        // longer trust its own data and must exit.
                        Err(err) if is_fatal(&err) => {
                            error!(
                                target: "sparseth::monitor",
                                monitor = %self.name,
                                num,
                                %hash,
                                %err,
                                "fatal store error"
                            );
                            return Err(err);
                        }
                        Err(err) => {
                            warn!(
                                target: "sparseth::monitor",
                                monitor = %self.name,
                                num,
                                %hash,
                                %err,
                                "failed to process block"
                            );
                        }
                    }
                }
            }
        }
    }
}

// Store-consistency errors are fatal to the node; everything else is a
// per-block failure. Wrapper enums at the state seams are unwrapped by
// hand because their transparent variants hide the inner type from the
// error chain.
fn is_fatal(err: &eyre::Report) -> bool {
    err.chain().any(|cause| {
        if let Some(err) = cause.downcast_ref::<ChainStoreError>() {
            return chain_store_fatal(err);
        }
        if let Some(StoreError::Closed) = cause.downcast_ref::<StoreError>() {
            return true;
        }
        if let Some(PrepareError::Store(err)) = cause.downcast_ref::<PrepareError>() {
            return chain_store_fatal(err);
        }
        if let Some(VerifyError::Store(err)) = cause.downcast_ref::<VerifyError>() {
            return chain_store_fatal(err);
        }
        if let Some(StateError::Store(err)) = cause.downcast_ref::<StateError>() {
            return chain_store_fatal(err);
        }
        false
    })
}

fn chain_store_fatal(err: &ChainStoreError) -> bool {
    matches!(
        err,
        ChainStoreError::Corrupted(_) | ChainStoreError::Store(StoreError::Closed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct RecordingProcessor {
        seen: mpsc::UnboundedSender<u64>,
        fail_on: Option<u64>,
    }

    #[async_trait]
    impl Processor for RecordingProcessor {
        async fn process_block(&mut self, header: &Header) -> eyre::Result<()> {
            self.seen.send(header.number).unwrap();
            if self.fail_on == Some(header.number) {
                eyre::bail!("boom");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn processes_blocks_in_order_and_survives_failures() {
        let dispatcher = Arc::new(Dispatcher::new());
        let sub = dispatcher.subscribe("test");

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let monitor = Monitor::new(
            "test",
            sub,
            RecordingProcessor {
                seen: seen_tx,
                fail_on: Some(2),
            },
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor.run(cancel.clone()));

        for num in 1..=3u64 {
            dispatcher.broadcast(Arc::new(Header {
                number: num,
                ..Default::default()
            }));
        }

        // The failing block 2 does not stop block 3 from being handled.
        assert_eq!(seen_rx.recv().await, Some(1));
        assert_eq!(seen_rx.recv().await, Some(2));
        assert_eq!(seen_rx.recv().await, Some(3));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    struct CorruptStoreProcessor;

    #[async_trait]
    impl Processor for CorruptStoreProcessor {
        async fn process_block(&mut self, _header: &Header) -> eyre::Result<()> {
            Err(ChainStoreError::Corrupted("dangling number index".to_string()).into())
        }
    }

    #[tokio::test]
    async fn store_corruption_is_fatal() {
        let dispatcher = Arc::new(Dispatcher::new());
        let sub = dispatcher.subscribe("test");

        let monitor = Monitor::new("test", sub, CorruptStoreProcessor);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor.run(cancel));

        dispatcher.broadcast(Arc::new(Header::default()));

        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn monitor_exits_on_cancellation() {
        let dispatcher = Arc::new(Dispatcher::new());
        let sub = dispatcher.subscribe("test");

        let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
        let monitor = Monitor::new(
            "test",
            sub,
            RecordingProcessor {
                seen: seen_tx,
                fail_on: None,
            },
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        monitor.run(cancel).await.unwrap();
    }
}
