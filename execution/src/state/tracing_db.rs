use std::collections::HashMap;

use alloy::primitives::{Address, Bytes, B256, U256};
use revm::database_interface::DBErrorMarker;
use revm::state::{Account, AccountInfo, Bytecode};
use revm::{Database, DatabaseCommit};
use thiserror::Error;

use super::tracer::Tracer;
use super::WorldState;

#[derive(Debug, Error)]
pub enum TracingDbError {
    // Code is always attached to the account info, so the EVM never has to
    // resolve it by hash.
    #[error("code_by_hash is not supported")]
    CodeByHash,
}

impl DBErrorMarker for TracingDbError {}

/// Transient, per-block state with read and write tracing.
///
/// The preparer loads the reconstructed pre-block state through the write
/// path, so loads count as writes; any read the execution performs that no
/// write preceded surfaces as an uninitialized read for the verifier.
pub struct TracingDb {
    world: WorldState,
    tracer: Tracer,
    block_hashes: HashMap<u64, B256>,
}

impl TracingDb {
    /// A fresh instance with an empty trace.
    pub fn new(world: WorldState) -> Self {
        Self {
            world,
            tracer: Tracer::default(),
            block_hashes: HashMap::new(),
        }
    }

    /// Known ancestor hashes for BLOCKHASH lookups. Unknown numbers
    /// resolve to zero; the node keeps no ancestor chain.
    pub fn insert_block_hash(&mut self, number: u64, hash: B256) {
        self.block_hashes.insert(number, hash);
    }

    /// Untraced view of the underlying state, for post-execution reads.
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn exist(&self, address: Address) -> bool {
        self.world.exist(address)
    }

    //
    // Write path, shared by the preparer and the commit hook.
    //

    pub fn create_account(&mut self, address: Address) {
        self.tracer.on_write_account(address);
        self.world.create_account(address);
    }

    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.tracer.on_write_account(address);
        self.world.set_nonce(address, nonce);
    }

    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.tracer.on_write_account(address);
        self.world.set_balance(address, balance);
    }

    pub fn set_code(&mut self, address: Address, code: Bytes) {
        self.tracer.on_write_account(address);
        self.world.set_code(address, code);
    }

    pub fn set_state(&mut self, address: Address, slot: B256, value: B256) {
        self.tracer.on_write_storage(address, slot);
        self.world.set_state(address, slot, value);
    }

    //
    // Trace accessors.
    //

    pub fn written_accounts(&self) -> Vec<Address> {
        self.tracer.written_accounts()
    }

    pub fn written_storage_slots(&self, address: Address) -> Vec<B256> {
        self.tracer.written_storage_slots(address)
    }

    pub fn uninitialized_account_reads(&self) -> Vec<Address> {
        self.tracer.uninitialized_account_reads()
    }

    pub fn uninitialized_storage_reads(&self) -> Vec<(Address, Vec<B256>)> {
        self.tracer.uninitialized_storage_reads()
    }
}

impl Database for TracingDb {
    type Error = TracingDbError;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        self.tracer.on_read_account(address);

        if !self.world.exist(address) {
            return Ok(None);
        }

        Ok(Some(AccountInfo {
            balance: self.world.balance(address),
            nonce: self.world.nonce(address),
            code_hash: self.world.code_hash(address),
            code: Some(Bytecode::new_raw(self.world.code(address))),
        }))
    }

    fn code_by_hash(&mut self, _code_hash: B256) -> Result<Bytecode, Self::Error> {
        Err(TracingDbError::CodeByHash)
    }

    fn storage(&mut self, address: Address, index: U256) -> Result<U256, Self::Error> {
        let slot = B256::from(index);
        self.tracer.on_read_storage(address, slot);
        Ok(U256::from_be_bytes(self.world.storage(address, slot).0))
    }

    fn block_hash(&mut self, number: u64) -> Result<B256, Self::Error> {
        Ok(self
            .block_hashes
            .get(&number)
            .copied()
            .unwrap_or(B256::ZERO))
    }
}

impl DatabaseCommit for TracingDb {
    fn commit(&mut self, changes: revm::primitives::HashMap<Address, Account>) {
        for (address, account) in changes {
            if !account.is_touched() {
                continue;
            }

            if account.is_selfdestructed() {
                self.tracer.on_write_account(address);
                self.world.remove_account(address);
                continue;
            }

            // Touched-but-empty objects are not materialized (EIP-161).
            if account.is_empty() && !self.world.exist(address) {
                continue;
            }

            self.tracer.on_write_account(address);
            if !self.world.exist(address) {
                self.world.create_account(address);
            }
            self.world.set_nonce(address, account.info.nonce);
            self.world.set_balance(address, account.info.balance);
            if let Some(code) = account.info.code {
                if !code.is_empty() {
                    self.world.set_code(address, code.original_bytes());
                }
            }

            for (index, slot) in account.storage {
                let key = B256::from(index);
                self.tracer.on_write_storage(address, key);
                self.world
                    .set_state(address, key, B256::from(slot.present_value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaded_state_satisfies_later_reads() {
        let mut db = TracingDb::new(WorldState::in_memory());
        let addr = Address::repeat_byte(0x01);

        db.create_account(addr);
        db.set_balance(addr, U256::from(5));

        let info = db.basic(addr).unwrap().unwrap();
        assert_eq!(info.balance, U256::from(5));
        assert!(db.uninitialized_account_reads().is_empty());
    }

    #[test]
    fn unloaded_account_read_is_flagged() {
        let mut db = TracingDb::new(WorldState::in_memory());
        let addr = Address::repeat_byte(0x02);

        assert!(db.basic(addr).unwrap().is_none());
        assert_eq!(db.uninitialized_account_reads(), vec![addr]);
    }

    #[test]
    fn unloaded_storage_read_is_flagged() {
        let mut db = TracingDb::new(WorldState::in_memory());
        let addr = Address::repeat_byte(0x03);
        let slot = U256::from(7);

        assert_eq!(db.storage(addr, slot).unwrap(), U256::ZERO);
        let reads = db.uninitialized_storage_reads();
        assert_eq!(reads, vec![(addr, vec![B256::from(slot)])]);
    }

    #[test]
    fn loaded_slot_read_is_not_flagged() {
        let mut db = TracingDb::new(WorldState::in_memory());
        let addr = Address::repeat_byte(0x04);
        let slot = B256::with_last_byte(1);

        db.create_account(addr);
        db.set_state(addr, slot, B256::with_last_byte(0x2a));

        let value = db.storage(addr, U256::from_be_bytes(slot.0)).unwrap();
        assert_eq!(value, U256::from(0x2a));
        assert!(db.uninitialized_storage_reads().is_empty());
    }

    #[test]
    fn known_block_hashes_resolve() {
        let mut db = TracingDb::new(WorldState::in_memory());
        db.insert_block_hash(10, B256::repeat_byte(0xaa));

        assert_eq!(db.block_hash(10).unwrap(), B256::repeat_byte(0xaa));
        assert_eq!(db.block_hash(11).unwrap(), B256::ZERO);
    }
}
