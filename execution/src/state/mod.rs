//! Sparse-mode state machinery: partial world-state reconstruction,
//! traced re-execution and verification against canonical roots.

mod executor;
mod journal;
mod preparer;
mod processor;
mod reverting_db;
mod tracer;
mod tracing_db;
mod verifier;
mod world;

pub use executor::{ExecutionOutcome, ExecutorError, TxExecutor};
pub use preparer::{PrepareError, Preparer};
pub use processor::TxProcessor;
pub use reverting_db::RevertingDb;
pub use tracing_db::{TracingDb, TracingDbError};
pub use verifier::StateVerifier;
pub use world::WorldState;

use alloy::primitives::{Address, B256};
use sparseth_chainstore::ChainStoreError;
use thiserror::Error;

use crate::errors::ExecutionError;

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Store(#[from] ChainStoreError),
    #[error("failed to decode state snapshot: {0}")]
    Snapshot(alloy_rlp::Error),
}

/// Failures detected while verifying a re-executed block. All of these
/// reject the block.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("uninitialized read of existing account {0}")]
    UninitializedAccountRead(Address),
    #[error("uninitialized read of non-default slot {slot} at {address}")]
    UninitializedStorageRead { address: Address, slot: B256 },
    #[error("account {0} exists on-chain but not in the world state")]
    AccountMissing(Address),
    #[error("nonce mismatch for {address}: expected {expected}, got {actual}")]
    NonceMismatch {
        address: Address,
        expected: u64,
        actual: u64,
    },
    #[error("balance mismatch for {address}")]
    BalanceMismatch { address: Address },
    #[error("code hash mismatch for {address}")]
    CodeHashMismatch { address: Address },
    #[error("storage root mismatch for {address}: expected {expected}, got {actual}")]
    StorageRootMismatch {
        address: Address,
        expected: B256,
        actual: B256,
    },
    #[error("interaction counter mismatch for {address}: expected {expected}, got {actual}")]
    CounterMismatch {
        address: Address,
        expected: B256,
        actual: B256,
    },
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Store(#[from] ChainStoreError),
}
