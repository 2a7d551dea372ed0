use alloy::primitives::{Address, B256};
use thiserror::Error;

use crate::mpt::MptError;

/// A failed call against the upstream RPC endpoint. Connectivity errors are
/// retriable on the next block; the caller decides.
#[derive(Debug, Error)]
#[error("rpc error on {method}: {source}")]
pub struct RpcError {
    pub method: &'static str,
    #[source]
    pub source: eyre::Report,
}

impl RpcError {
    pub fn new<E: Into<eyre::Report>>(method: &'static str, err: E) -> Self {
        Self {
            method,
            source: err.into(),
        }
    }
}

/// Data-integrity and lookup failures raised by the verified provider and
/// the verifiers built on top of it. Integrity failures reject the block
/// they were observed in.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("invalid account proof for address {0}")]
    InvalidAccountProof(Address, #[source] MptError),
    #[error("invalid storage proof for address {0}, slot {1}")]
    InvalidStorageProof(Address, B256, #[source] MptError),
    #[error("missing storage proof for slot {0}")]
    MissingStorageProof(B256),
    #[error("transaction root mismatch at block {block}: expected {expected}, computed {computed}")]
    TxRootMismatch {
        block: u64,
        expected: B256,
        computed: B256,
    },
    #[error("code hash mismatch for address {address}: expected {expected}, computed {computed}")]
    CodeHashMismatch {
        address: Address,
        expected: B256,
        computed: B256,
    },
    #[error("account {0} does not exist at block {1}")]
    AccountNotFound(Address, u64),
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}
