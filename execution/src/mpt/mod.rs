//! Merkle-Patricia proof verification.
//!
//! All on-chain reads in the node flow through [`verify_account_proof`] and
//! [`verify_storage_proof`]: data is only accepted if it is witnessed by a
//! proof against an already-trusted root.

mod node;
mod proof;

pub use proof::verify_proof;

use alloy::primitives::{keccak256, Address, B256, U256};
use alloy_rlp::{Decodable, RlpDecodable};
use alloy_trie::EMPTY_ROOT_HASH;
use thiserror::Error;

use crate::types::Account;

#[derive(Debug, Error)]
pub enum MptError {
    #[error("malformed proof node: {0}")]
    Malformed(&'static str),
    #[error("proof node {0} missing")]
    MissingNode(B256),
    #[error("failed to decode proof node: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    #[error("failed to decode leaf payload: {0}")]
    Value(alloy_rlp::Error),
}

// The account leaf layout of the state trie.
#[derive(Debug, RlpDecodable)]
struct StateAccount {
    nonce: u64,
    balance: U256,
    storage_root: B256,
    code_hash: B256,
}

/// Verifies a Merkle proof for an Ethereum account against a state root.
///
/// Returns `None` if the proof is a valid exclusion proof, i.e. the account
/// does not exist under the given root.
pub fn verify_account_proof(
    state_root: B256,
    address: Address,
    proof: &[impl AsRef<[u8]>],
) -> Result<Option<Account>, MptError> {
    let key = keccak256(address);
    let Some(payload) = verify_proof(state_root, key, proof)? else {
        return Ok(None);
    };

    let account = StateAccount::decode(&mut payload.as_slice()).map_err(MptError::Value)?;
    Ok(Some(Account {
        address,
        nonce: account.nonce,
        balance: account.balance,
        storage_root: account.storage_root,
        code_hash: account.code_hash,
    }))
}

/// Verifies a Merkle proof for a storage slot against a storage root.
///
/// The slot key must already be the keccak256 hash of the 32-byte slot.
/// Returns the stored value bytes (leading zeroes stripped, as the trie
/// stores them), or `None` if no value exists for the slot.
pub fn verify_storage_proof(
    storage_root: B256,
    slot_hash: B256,
    proof: &[impl AsRef<[u8]>],
) -> Result<Option<Vec<u8>>, MptError> {
    if storage_root == EMPTY_ROOT_HASH {
        // No storage for any key.
        return Ok(None);
    }

    let Some(payload) = verify_proof(storage_root, slot_hash, proof)? else {
        return Ok(None);
    };

    let value: Vec<u8> =
        Decodable::decode(&mut payload.as_slice()).map_err(MptError::Value)?;
    Ok(Some(value))
}
