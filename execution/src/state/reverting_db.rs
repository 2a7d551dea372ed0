use alloy::primitives::{Address, Bytes, B256, U256};

use super::journal::Journal;
use super::{StateError, WorldState};

/// The persistent sparse world state, wrapped with a journal so that
/// finalised changes of a failed block can be rolled back.
///
/// Owned exclusively by the sparse-mode monitor for the lifetime of the
/// process; a block's mutations are only durable once `commit` ran.
pub struct RevertingDb {
    world: WorldState,
    journal: Journal,
}

impl RevertingDb {
    pub fn new(world: WorldState) -> Self {
        Self {
            world,
            journal: Journal::default(),
        }
    }

    /// Reconstructs an instance at a previously committed root, sharing
    /// the same backing store.
    pub fn with_root(&self, root: B256) -> Result<Self, StateError> {
        Ok(Self {
            world: WorldState::with_root(self.world.store().clone(), root)?,
            journal: Journal::default(),
        })
    }

    //
    // Reads.
    //

    pub fn exist(&self, address: Address) -> bool {
        self.world.exist(address)
    }

    pub fn nonce(&self, address: Address) -> u64 {
        self.world.nonce(address)
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.world.balance(address)
    }

    pub fn code_hash(&self, address: Address) -> B256 {
        self.world.code_hash(address)
    }

    pub fn storage(&self, address: Address, slot: B256) -> B256 {
        self.world.storage(address, slot)
    }

    pub fn storage_root(&self, address: Address) -> B256 {
        self.world.storage_root(address)
    }

    pub fn state_root(&self) -> B256 {
        self.world.state_root()
    }

    //
    // Journaled writes.
    //

    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.journal.nonce_change(address, self.world.nonce(address));
        self.world.set_nonce(address, nonce);
    }

    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.journal
            .balance_change(address, self.world.balance(address));
        self.world.set_balance(address, balance);
    }

    pub fn set_code(&mut self, address: Address, code: Bytes) {
        let prev = self.world.set_code(address, code);
        self.journal.code_change(address, prev);
    }

    pub fn set_state(&mut self, address: Address, slot: B256, value: B256) {
        let prev = self.world.set_state(address, slot, value);
        self.journal.storage_change(address, slot, prev);
    }

    /// Undoes every change since the last commit.
    pub fn revert(&mut self) {
        self.journal.revert(&mut self.world);
    }

    /// Clears the journal and persists the state, returning the new root.
    pub fn commit(&mut self, block: u64) -> Result<B256, StateError> {
        self.journal.reset();
        self.world.commit(block)
    }
}
