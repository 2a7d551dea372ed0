use alloy::consensus::{Header, TxEnvelope};
use alloy::eips::eip2930::AccessList;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::ext::DebugApi;
use alloy::providers::{Provider as _, RootProvider};
use alloy::rpc::client::ClientBuilder;
use alloy::rpc::types::trace::geth::{GethDebugTracingOptions, PreStateConfig, PreStateFrame};
use alloy::rpc::types::{EIP1186AccountProofResponse, Filter, Log, TransactionRequest};
use async_trait::async_trait;
use eyre::eyre;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::errors::RpcError;

use super::ExecutionRpc;

/// [`ExecutionRpc`] over an HTTP, WebSocket or IPC endpoint. The transport
/// is chosen by the connect string; header subscriptions require one of the
/// pubsub transports.
pub struct HttpRpc {
    url: String,
    provider: RootProvider,
}

impl HttpRpc {
    pub async fn connect(url: &str) -> Result<Self, RpcError> {
        let client = ClientBuilder::default()
            .connect(url)
            .await
            .map_err(|e| RpcError::new("connect", e))?;

        Ok(Self {
            url: url.to_string(),
            provider: RootProvider::new(client),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn header_for(&self, tag: BlockNumberOrTag) -> Result<Header, RpcError> {
        let block = self
            .provider
            .get_block_by_number(tag)
            .await
            .map_err(|e| RpcError::new("get_block_by_number", e))?
            .ok_or_else(|| RpcError::new("get_block_by_number", eyre!("block {tag} not found")))?;

        Ok(block.header.into_consensus())
    }
}

#[async_trait]
impl ExecutionRpc for HttpRpc {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| RpcError::new("chain_id", e))
    }

    async fn get_latest_header(&self) -> Result<Header, RpcError> {
        self.header_for(BlockNumberOrTag::Latest).await
    }

    async fn get_header_by_number(&self, num: u64) -> Result<Header, RpcError> {
        self.header_for(num.into()).await
    }

    async fn get_header_by_hash(&self, hash: B256) -> Result<Header, RpcError> {
        let block = self
            .provider
            .get_block_by_hash(hash)
            .await
            .map_err(|e| RpcError::new("get_block_by_hash", e))?
            .ok_or_else(|| RpcError::new("get_block_by_hash", eyre!("block {hash} not found")))?;

        Ok(block.header.into_consensus())
    }

    async fn get_block_txs(&self, num: u64) -> Result<Option<Vec<TxEnvelope>>, RpcError> {
        let block = self
            .provider
            .get_block_by_number(num.into())
            .full()
            .await
            .map_err(|e| RpcError::new("get_block_by_number", e))?;

        Ok(block.map(|block| {
            block
                .transactions
                .into_transactions()
                .map(|tx| tx.inner.into_parts().0)
                .collect()
        }))
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        self.provider
            .get_logs(filter)
            .await
            .map_err(|e| RpcError::new("get_logs", e))
    }

    async fn get_proof(
        &self,
        address: Address,
        slots: &[B256],
        block: u64,
    ) -> Result<EIP1186AccountProofResponse, RpcError> {
        self.provider
            .get_proof(address, slots.to_vec())
            .block_id(block.into())
            .await
            .map_err(|e| RpcError::new("get_proof", e))
    }

    async fn get_code(&self, address: Address, block: u64) -> Result<Bytes, RpcError> {
        self.provider
            .get_code_at(address)
            .block_id(block.into())
            .await
            .map_err(|e| RpcError::new("get_code", e))
    }

    async fn create_access_list(
        &self,
        tx: &TransactionRequest,
        block: u64,
    ) -> Result<AccessList, RpcError> {
        let result = self
            .provider
            .create_access_list(tx)
            .block_id(block.into())
            .await
            .map_err(|e| RpcError::new("create_access_list", e))?;

        Ok(result.access_list)
    }

    async fn trace_prestate(&self, tx_hash: B256) -> Result<PreStateFrame, RpcError> {
        let options = GethDebugTracingOptions::prestate_tracer(PreStateConfig::default());
        let trace = self
            .provider
            .debug_trace_transaction(tx_hash, options)
            .await
            .map_err(|e| RpcError::new("trace_prestate", e))?;

        trace
            .try_into_pre_state_frame()
            .map_err(|e| RpcError::new("trace_prestate", eyre!("unexpected trace frame: {e}")))
    }

    async fn subscribe_headers(&self) -> Result<BoxStream<'static, Header>, RpcError> {
        let subscription = self
            .provider
            .subscribe_blocks()
            .await
            .map_err(|e| RpcError::new("subscribe_blocks", e))?;

        Ok(subscription
            .into_stream()
            .map(|header| header.into_consensus())
            .boxed())
    }
}
