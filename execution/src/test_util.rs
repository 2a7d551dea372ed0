//! Shared helpers for tests: builds small secure tries and eth_getProof
//! style responses from them, so verification paths run against real
//! Merkle material instead of canned bytes.

use std::collections::BTreeMap;

use alloy::primitives::{keccak256, Address, Bytes, B256, KECCAK256_EMPTY, U256};
use alloy::rpc::types::{EIP1186AccountProofResponse, EIP1186StorageProof};
use alloy::serde::JsonStorageKey;
use alloy_rlp::RlpEncodable;
use alloy_trie::{proof::ProofRetainer, HashBuilder, Nibbles, EMPTY_ROOT_HASH};

#[derive(RlpEncodable)]
struct EncAccount {
    nonce: u64,
    balance: U256,
    storage_root: B256,
    code_hash: B256,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TrieEntry {
    pub nonce: u64,
    pub balance: U256,
    pub code: Bytes,
    pub storage: BTreeMap<B256, B256>,
}

/// A miniature world state that can produce real account and storage
/// proofs for any address, present or absent.
#[derive(Debug, Clone, Default)]
pub(crate) struct StateTrie {
    accounts: BTreeMap<Address, TrieEntry>,
}

impl StateTrie {
    pub fn insert_account(
        &mut self,
        address: Address,
        nonce: u64,
        balance: U256,
        slots: &[(B256, B256)],
    ) {
        self.insert_contract(address, nonce, balance, &Bytes::new(), slots);
    }

    pub fn insert_contract(
        &mut self,
        address: Address,
        nonce: u64,
        balance: U256,
        code: &Bytes,
        slots: &[(B256, B256)],
    ) {
        let entry = TrieEntry {
            nonce,
            balance,
            code: code.clone(),
            storage: slots.iter().copied().collect(),
        };
        self.accounts.insert(address, entry);
    }

    pub fn entry(&self, address: Address) -> Option<&TrieEntry> {
        self.accounts.get(&address)
    }

    fn code_hash(entry: &TrieEntry) -> B256 {
        if entry.code.is_empty() {
            KECCAK256_EMPTY
        } else {
            keccak256(&entry.code)
        }
    }

    pub fn storage_root(&self, address: Address) -> B256 {
        let Some(entry) = self.accounts.get(&address) else {
            return EMPTY_ROOT_HASH;
        };
        let leaves: BTreeMap<B256, Vec<u8>> = entry
            .storage
            .iter()
            .filter(|(_, value)| **value != B256::ZERO)
            .map(|(slot, value)| {
                (
                    keccak256(slot),
                    alloy_rlp::encode(U256::from_be_bytes(value.0)),
                )
            })
            .collect();
        build_root(&leaves, None).0
    }

    fn account_leaves(&self) -> BTreeMap<B256, Vec<u8>> {
        self.accounts
            .iter()
            .map(|(address, entry)| {
                let account = EncAccount {
                    nonce: entry.nonce,
                    balance: entry.balance,
                    storage_root: self.storage_root(*address),
                    code_hash: Self::code_hash(entry),
                };
                (keccak256(address), alloy_rlp::encode(&account))
            })
            .collect()
    }

    pub fn root(&self) -> B256 {
        build_root(&self.account_leaves(), None).0
    }

    pub fn account_proof(&self, address: Address) -> Vec<Bytes> {
        build_root(&self.account_leaves(), Some(keccak256(address))).1
    }

    pub fn storage_proof(&self, address: Address, slot: B256) -> Vec<Bytes> {
        let Some(entry) = self.accounts.get(&address) else {
            return Vec::new();
        };
        let leaves: BTreeMap<B256, Vec<u8>> = entry
            .storage
            .iter()
            .filter(|(_, value)| **value != B256::ZERO)
            .map(|(s, value)| {
                (
                    keccak256(s),
                    alloy_rlp::encode(U256::from_be_bytes(value.0)),
                )
            })
            .collect();
        build_root(&leaves, Some(keccak256(slot))).1
    }
}

fn build_root(leaves: &BTreeMap<B256, Vec<u8>>, target: Option<B256>) -> (B256, Vec<Bytes>) {
    let mut hb = match target {
        Some(target) => {
            let retainer = ProofRetainer::new(vec![Nibbles::unpack(target)]);
            HashBuilder::default().with_proof_retainer(retainer)
        }
        None => HashBuilder::default(),
    };
    for (key, value) in leaves {
        hb.add_leaf(Nibbles::unpack(key), value);
    }
    let root = hb.root();
    let proof = hb
        .take_proof_nodes()
        .into_nodes_sorted()
        .into_iter()
        .map(|node| node.1)
        .collect();
    (root, proof)
}

/// Builds the `eth_getProof` response the mock endpoint serves for the
/// given address and slots.
pub(crate) fn proof_response(
    trie: &StateTrie,
    address: Address,
    slots: &[B256],
) -> EIP1186AccountProofResponse {
    let entry = trie.entry(address).cloned().unwrap_or_default();

    let storage_proof = slots
        .iter()
        .map(|slot| EIP1186StorageProof {
            key: JsonStorageKey::Hash(*slot),
            value: entry
                .storage
                .get(slot)
                .map(|value| U256::from_be_bytes(value.0))
                .unwrap_or_default(),
            proof: trie.storage_proof(address, *slot),
        })
        .collect();

    EIP1186AccountProofResponse {
        address,
        balance: entry.balance,
        nonce: entry.nonce,
        code_hash: StateTrie::code_hash(&entry),
        storage_hash: trie.storage_root(address),
        account_proof: trie.account_proof(address),
        storage_proof,
    }
}
