//! Raw access to the upstream Ethereum RPC endpoint.
//!
//! Nothing returned here is trusted on its own; the [`Provider`] layers the
//! proof checks on top.
//!
//! [`Provider`]: crate::provider::Provider

mod http_rpc;
pub mod mock_rpc;

pub use http_rpc::HttpRpc;

use alloy::consensus::{Header, TxEnvelope};
use alloy::eips::eip2930::AccessList;
use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::trace::geth::PreStateFrame;
use alloy::rpc::types::{EIP1186AccountProofResponse, Filter, Log, TransactionRequest};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::RpcError;

/// Typed wrapper over the Ethereum RPC API.
#[async_trait]
pub trait ExecutionRpc: Send + Sync + 'static {
    async fn chain_id(&self) -> Result<u64, RpcError>;

    /// Fetches the current canonical tip header.
    async fn get_latest_header(&self) -> Result<Header, RpcError>;

    async fn get_header_by_number(&self, num: u64) -> Result<Header, RpcError>;

    async fn get_header_by_hash(&self, hash: B256) -> Result<Header, RpcError>;

    /// Fetches the full, ordered transaction list of a block, or `None` if
    /// the block is unknown to the endpoint.
    async fn get_block_txs(&self, num: u64) -> Result<Option<Vec<TxEnvelope>>, RpcError>;

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError>;

    /// `eth_getProof` for the account and the given storage slots at the
    /// given block number.
    async fn get_proof(
        &self,
        address: Address,
        slots: &[B256],
        block: u64,
    ) -> Result<EIP1186AccountProofResponse, RpcError>;

    async fn get_code(&self, address: Address, block: u64) -> Result<Bytes, RpcError>;

    /// `eth_createAccessList` hint; integrity is not relied upon.
    async fn create_access_list(
        &self,
        tx: &TransactionRequest,
        block: u64,
    ) -> Result<AccessList, RpcError>;

    /// `debug_traceTransaction` with the prestate tracer; hint only.
    async fn trace_prestate(&self, tx_hash: B256) -> Result<PreStateFrame, RpcError>;

    /// Subscribes to new canonical heads. Requires a pubsub transport.
    async fn subscribe_headers(&self) -> Result<BoxStream<'static, Header>, RpcError>;
}
