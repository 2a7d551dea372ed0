use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use alloy::primitives::{keccak256, Address, Bytes, B256, KECCAK256_EMPTY, U256};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};
use alloy_trie::{HashBuilder, Nibbles, EMPTY_ROOT_HASH};
use sparseth_chainstore::StateStore;
use sparseth_storage::MemoryStore;
use tracing::debug;

use super::StateError;

#[derive(Debug, Clone)]
struct AccountRecord {
    nonce: u64,
    balance: U256,
    code: Bytes,
    code_hash: B256,
}

impl Default for AccountRecord {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            code: Bytes::new(),
            code_hash: KECCAK256_EMPTY,
        }
    }
}

// Snapshot layout persisted through the StateStore. The store treats it as
// opaque bytes keyed by the state root.
#[derive(RlpEncodable, RlpDecodable)]
struct SnapshotSlot {
    slot: B256,
    value: B256,
}

#[derive(RlpEncodable, RlpDecodable)]
struct SnapshotAccount {
    address: Address,
    nonce: u64,
    balance: U256,
    code: Bytes,
    slots: Vec<SnapshotSlot>,
}

#[derive(RlpEncodable, RlpDecodable)]
struct Snapshot {
    accounts: Vec<SnapshotAccount>,
}

/// The locally reconstructed subset of the world state.
///
/// Accounts and storage are held in memory; `commit` computes the secure
/// trie root over the tracked subset and persists a snapshot under it, and
/// `with_root` rebinds a previously committed root over the same backing
/// store. Because the state only ever contains the monitored subset, root
/// computation stays proportional to what is tracked.
pub struct WorldState {
    store: StateStore,
    accounts: HashMap<Address, AccountRecord>,
    storage: HashMap<Address, BTreeMap<B256, B256>>,
}

impl WorldState {
    /// An empty state over the given snapshot store.
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            accounts: HashMap::new(),
            storage: HashMap::new(),
        }
    }

    /// A fresh transient state over an in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(StateStore::new(Arc::new(MemoryStore::new())))
    }

    /// Rebinds a previously committed state root.
    pub fn with_root(store: StateStore, root: B256) -> Result<Self, StateError> {
        if root == EMPTY_ROOT_HASH {
            return Ok(Self::new(store));
        }

        let raw = store.snapshot(root)?;
        let snapshot =
            Snapshot::decode(&mut raw.as_slice()).map_err(StateError::Snapshot)?;

        let mut world = Self::new(store);
        for account in snapshot.accounts {
            let code_hash = if account.code.is_empty() {
                KECCAK256_EMPTY
            } else {
                keccak256(&account.code)
            };
            world.accounts.insert(
                account.address,
                AccountRecord {
                    nonce: account.nonce,
                    balance: account.balance,
                    code: account.code,
                    code_hash,
                },
            );
            if !account.slots.is_empty() {
                world.storage.insert(
                    account.address,
                    account
                        .slots
                        .into_iter()
                        .map(|entry| (entry.slot, entry.value))
                        .collect(),
                );
            }
        }
        Ok(world)
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn exist(&self, address: Address) -> bool {
        self.accounts.contains_key(&address)
    }

    pub fn nonce(&self, address: Address) -> u64 {
        self.accounts.get(&address).map(|acc| acc.nonce).unwrap_or(0)
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.accounts
            .get(&address)
            .map(|acc| acc.balance)
            .unwrap_or(U256::ZERO)
    }

    pub fn code(&self, address: Address) -> Bytes {
        self.accounts
            .get(&address)
            .map(|acc| acc.code.clone())
            .unwrap_or_default()
    }

    pub fn code_hash(&self, address: Address) -> B256 {
        self.accounts
            .get(&address)
            .map(|acc| acc.code_hash)
            .unwrap_or(KECCAK256_EMPTY)
    }

    pub fn storage(&self, address: Address, slot: B256) -> B256 {
        self.storage
            .get(&address)
            .and_then(|slots| slots.get(&slot))
            .copied()
            .unwrap_or(B256::ZERO)
    }

    /// Creates an account with default fields, keeping any storage already
    /// tracked for the address.
    pub fn create_account(&mut self, address: Address) {
        self.accounts.insert(address, AccountRecord::default());
    }

    pub fn remove_account(&mut self, address: Address) {
        self.accounts.remove(&address);
        self.storage.remove(&address);
    }

    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.accounts.entry(address).or_default().nonce = nonce;
    }

    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.accounts.entry(address).or_default().balance = balance;
    }

    /// Replaces the account code, returning the previous code.
    pub fn set_code(&mut self, address: Address, code: Bytes) -> Bytes {
        let record = self.accounts.entry(address).or_default();
        let prev = std::mem::replace(&mut record.code, code);
        record.code_hash = if record.code.is_empty() {
            KECCAK256_EMPTY
        } else {
            keccak256(&record.code)
        };
        prev
    }

    /// Writes a storage slot, returning the previous value.
    pub fn set_state(&mut self, address: Address, slot: B256, value: B256) -> B256 {
        self.storage
            .entry(address)
            .or_default()
            .insert(slot, value)
            .unwrap_or(B256::ZERO)
    }

    /// The storage trie root over the slots tracked for this account.
    pub fn storage_root(&self, address: Address) -> B256 {
        let Some(slots) = self.storage.get(&address) else {
            return EMPTY_ROOT_HASH;
        };

        // Zero-valued slots are absent from the trie.
        let leaves: BTreeMap<B256, Vec<u8>> = slots
            .iter()
            .filter(|(_, value)| **value != B256::ZERO)
            .map(|(slot, value)| {
                (
                    keccak256(slot),
                    alloy_rlp::encode(U256::from_be_bytes(value.0)),
                )
            })
            .collect();

        trie_root(&leaves)
    }

    /// The state trie root over all tracked accounts.
    pub fn state_root(&self) -> B256 {
        #[derive(RlpEncodable)]
        struct TrieAccount {
            nonce: u64,
            balance: U256,
            storage_root: B256,
            code_hash: B256,
        }

        let leaves: BTreeMap<B256, Vec<u8>> = self
            .accounts
            .iter()
            .map(|(address, record)| {
                let account = TrieAccount {
                    nonce: record.nonce,
                    balance: record.balance,
                    storage_root: self.storage_root(*address),
                    code_hash: record.code_hash,
                };
                (keccak256(address), alloy_rlp::encode(&account))
            })
            .collect();

        trie_root(&leaves)
    }

    /// Computes the state root and persists a snapshot under it. The root
    /// can later be rebound with [`WorldState::with_root`].
    pub fn commit(&self, block: u64) -> Result<B256, StateError> {
        let root = self.state_root();

        let mut accounts: Vec<SnapshotAccount> = self
            .accounts
            .iter()
            .map(|(address, record)| SnapshotAccount {
                address: *address,
                nonce: record.nonce,
                balance: record.balance,
                code: record.code.clone(),
                slots: self
                    .storage
                    .get(address)
                    .map(|slots| {
                        slots
                            .iter()
                            .map(|(slot, value)| SnapshotSlot {
                                slot: *slot,
                                value: *value,
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();
        accounts.sort_by_key(|account| account.address);

        let snapshot = Snapshot { accounts };
        self.store.put_snapshot(root, &alloy_rlp::encode(&snapshot))?;

        debug!(target: "sparseth::state", block, %root, "committed world state");
        Ok(root)
    }
}

fn trie_root(leaves: &BTreeMap<B256, Vec<u8>>) -> B256 {
    if leaves.is_empty() {
        return EMPTY_ROOT_HASH;
    }
    let mut hb = HashBuilder::default();
    for (key, value) in leaves {
        hb.add_leaf(Nibbles::unpack(key), value);
    }
    hb.root()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_state_has_empty_root() {
        let world = WorldState::in_memory();
        assert_eq!(world.state_root(), EMPTY_ROOT_HASH);
        assert_eq!(world.storage_root(Address::ZERO), EMPTY_ROOT_HASH);
    }

    #[test]
    fn reads_of_absent_accounts_are_defaults() {
        let world = WorldState::in_memory();
        let addr = Address::repeat_byte(0x01);

        assert!(!world.exist(addr));
        assert_eq!(world.nonce(addr), 0);
        assert_eq!(world.balance(addr), U256::ZERO);
        assert_eq!(world.code_hash(addr), KECCAK256_EMPTY);
        assert_eq!(world.storage(addr, B256::ZERO), B256::ZERO);
    }

    #[test]
    fn writes_update_reads() {
        let mut world = WorldState::in_memory();
        let addr = Address::repeat_byte(0x01);
        let slot = B256::with_last_byte(1);

        world.create_account(addr);
        world.set_nonce(addr, 7);
        world.set_balance(addr, U256::from(100));
        world.set_code(addr, Bytes::from(vec![0x60]));
        world.set_state(addr, slot, B256::with_last_byte(9));

        assert!(world.exist(addr));
        assert_eq!(world.nonce(addr), 7);
        assert_eq!(world.balance(addr), U256::from(100));
        assert_eq!(world.code_hash(addr), keccak256([0x60]));
        assert_eq!(world.storage(addr, slot), B256::with_last_byte(9));
    }

    #[test]
    fn zero_slots_do_not_affect_storage_root() {
        let mut world = WorldState::in_memory();
        let addr = Address::repeat_byte(0x01);
        world.create_account(addr);
        world.set_state(addr, B256::with_last_byte(1), B256::ZERO);

        assert_eq!(world.storage_root(addr), EMPTY_ROOT_HASH);
    }

    #[test]
    fn commit_and_rebind_roundtrip() {
        let store = StateStore::new(Arc::new(MemoryStore::new()));
        let mut world = WorldState::new(store.clone());
        let addr = Address::repeat_byte(0x01);
        let slot = B256::with_last_byte(2);

        world.create_account(addr);
        world.set_nonce(addr, 3);
        world.set_balance(addr, U256::from(55));
        world.set_code(addr, Bytes::from(vec![0xfe]));
        world.set_state(addr, slot, B256::with_last_byte(0x2a));

        let root = world.commit(10).unwrap();

        let reloaded = WorldState::with_root(store, root).unwrap();
        assert_eq!(reloaded.state_root(), root);
        assert_eq!(reloaded.nonce(addr), 3);
        assert_eq!(reloaded.balance(addr), U256::from(55));
        assert_eq!(reloaded.code(addr), Bytes::from(vec![0xfe]));
        assert_eq!(reloaded.storage(addr, slot), B256::with_last_byte(0x2a));
    }

    #[test]
    fn state_root_tracks_mutations() {
        let mut world = WorldState::in_memory();
        let addr = Address::repeat_byte(0x01);

        world.create_account(addr);
        world.set_balance(addr, U256::from(1));
        let first = world.state_root();

        world.set_balance(addr, U256::from(2));
        let second = world.state_root();
        assert_ne!(first, second);

        world.set_balance(addr, U256::from(1));
        assert_eq!(world.state_root(), first);
    }
}
