use alloy::consensus::Header;
use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use eyre::eyre;
use sparseth_chainstore::EventStore;
use sparseth_config::AccountConfig;
use tracing::debug;

use crate::errors::ExecutionError;
use crate::monitor::Processor;
use crate::provider::Provider;
use crate::rpc::ExecutionRpc;

use super::LogVerifier;

/// Downloads, verifies and stores the event logs of one monitored
/// contract. One instance runs per event-enabled account.
pub struct LogProcessor<R: ExecutionRpc> {
    address: Address,
    head_slot: B256,
    provider: Provider<R>,
    verifier: LogVerifier,
    store: EventStore,
}

impl<R: ExecutionRpc> LogProcessor<R> {
    pub fn new(
        account: &AccountConfig,
        provider: Provider<R>,
        store: EventStore,
    ) -> eyre::Result<Self> {
        let event = account
            .event
            .as_ref()
            .ok_or_else(|| eyre!("account {} has no event config", account.address))?;

        // Resume from the last verified head; a first run starts at the
        // zero seed the contract was initialized with.
        let head = store.chain_head(account.address)?.unwrap_or_default();

        Ok(Self {
            address: account.address,
            head_slot: event.head_slot,
            provider,
            verifier: LogVerifier::new(event.abi.clone(), head),
            store,
        })
    }

    // Reads the on-chain chain head at the given block. A contract that is
    // not deployed yet has no head; the zero seed stands in for it.
    async fn expected_head(&self, header: &Header) -> Result<B256, ExecutionError> {
        match self
            .provider
            .get_storage_at_block(self.address, self.head_slot, header)
            .await
        {
            Ok(value) => Ok(value.unwrap_or_default()),
            Err(ExecutionError::AccountNotFound(..)) => Ok(B256::ZERO),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl<R: ExecutionRpc> Processor for LogProcessor<R> {
    async fn process_block(&mut self, header: &Header) -> eyre::Result<()> {
        let num = header.number;
        debug!(target: "sparseth::event", account = %self.address, num, "download logs for block");
        let logs = self
            .provider
            .get_logs_at_block(self.address, num)
            .await?;

        let expected = self.expected_head(header).await?;

        debug!(target: "sparseth::event", account = %self.address, num, logs = logs.len(), "verify logs for block");
        self.verifier.verify_logs(&logs, expected)?;

        self.store.put_all(&logs)?;
        self.store.put_chain_head(self.address, self.verifier.head())?;

        debug!(target: "sparseth::event", account = %self.address, num, "block processed");
        Ok(())
    }
}
