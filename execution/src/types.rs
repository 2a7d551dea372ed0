use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::eips::eip2930::AccessList;
use alloy::primitives::{Address, Bloom, Bytes, B256, U256};

/// A verified account snapshot, as witnessed by a Merkle-Patricia proof
/// against a trusted state root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub address: Address,
    pub nonce: u64,
    pub balance: U256,
    pub code_hash: B256,
    pub storage_root: B256,
}

/// A canonical transaction together with its position in the block.
#[derive(Debug, Clone)]
pub struct TxWithIndex {
    pub tx: TxEnvelope,
    pub index: u64,
}

/// A transaction admitted by the relevance filter, wrapped with its
/// recovered sender and the access-list hint used for state loading.
#[derive(Debug, Clone)]
pub struct TxWithContext {
    pub tx: TxEnvelope,
    pub index: u64,
    pub sender: Address,
    pub access_list: AccessList,
}

impl TxWithIndex {
    /// Recovers the sender via the chain's signature rules.
    pub fn recover_sender(&self) -> Result<Address, alloy::consensus::crypto::RecoveryError> {
        self.tx.recover_signer()
    }
}

/// Receipt produced by re-executing a filtered transaction.
#[derive(Debug, Clone)]
pub struct Receipt {
    /// Execution success. Failed transactions still consume gas and
    /// produce a receipt.
    pub status: bool,
    /// Intermediate post-state root; only present before Byzantium.
    pub post_state: Option<B256>,
    pub tx_type: u8,
    pub tx_hash: B256,
    pub tx_index: u64,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    pub block_hash: B256,
    pub block_number: u64,
    /// Blob fields, set for blob-carrying transaction types only.
    pub blob_gas_used: Option<u64>,
    pub blob_gas_price: Option<u128>,
    /// Address of the created contract for creation transactions.
    pub contract_address: Option<Address>,
    pub logs: Vec<alloy::primitives::Log>,
    pub bloom: Bloom,
}

impl Receipt {
    pub fn contract_address_for(tx: &TxEnvelope, sender: Address) -> Option<Address> {
        tx.kind().is_create().then(|| sender.create(tx.nonce()))
    }
}

/// Raw proof material handed to the MPT verifier.
pub type ProofNodes = Vec<Bytes>;
