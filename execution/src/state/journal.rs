use alloy::primitives::{Address, Bytes, B256, U256};

use super::WorldState;

// A recorded prior value; reverting applies it back.
#[derive(Debug)]
enum JournalEntry {
    NonceChange { address: Address, prev: u64 },
    BalanceChange { address: Address, prev: U256 },
    CodeChange { address: Address, prev: Bytes },
    StorageChange { address: Address, slot: B256, prev: B256 },
}

impl JournalEntry {
    fn revert(self, world: &mut WorldState) {
        match self {
            Self::NonceChange { address, prev } => world.set_nonce(address, prev),
            Self::BalanceChange { address, prev } => world.set_balance(address, prev),
            Self::CodeChange { address, prev } => {
                world.set_code(address, prev);
            }
            Self::StorageChange { address, slot, prev } => {
                world.set_state(address, slot, prev);
            }
        }
    }
}

/// Records prior values for every mutation of the persistent state so a
/// failed block can be rolled back without cloning the state.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn nonce_change(&mut self, address: Address, prev: u64) {
        self.entries.push(JournalEntry::NonceChange { address, prev });
    }

    pub fn balance_change(&mut self, address: Address, prev: U256) {
        self.entries.push(JournalEntry::BalanceChange { address, prev });
    }

    pub fn code_change(&mut self, address: Address, prev: Bytes) {
        self.entries.push(JournalEntry::CodeChange { address, prev });
    }

    pub fn storage_change(&mut self, address: Address, slot: B256, prev: B256) {
        self.entries
            .push(JournalEntry::StorageChange { address, slot, prev });
    }

    /// Rewinds all changes recorded since the last reset, most recent
    /// first. The journal is drained, so a second revert is a no-op.
    pub fn revert(&mut self, world: &mut WorldState) {
        while let Some(entry) = self.entries.pop() {
            entry.revert(world);
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_restores_prior_values_in_reverse_order() {
        let mut world = WorldState::in_memory();
        let mut journal = Journal::default();
        let addr = Address::repeat_byte(0x01);
        let slot = B256::with_last_byte(1);

        world.create_account(addr);
        world.set_balance(addr, U256::from(10));

        journal.balance_change(addr, world.balance(addr));
        world.set_balance(addr, U256::from(20));
        journal.balance_change(addr, world.balance(addr));
        world.set_balance(addr, U256::from(30));
        journal.storage_change(addr, slot, world.storage(addr, slot));
        world.set_state(addr, slot, B256::with_last_byte(5));

        journal.revert(&mut world);

        assert_eq!(world.balance(addr), U256::from(10));
        assert_eq!(world.storage(addr, slot), B256::ZERO);
    }

    #[test]
    fn revert_after_reset_is_noop() {
        let mut world = WorldState::in_memory();
        let mut journal = Journal::default();
        let addr = Address::repeat_byte(0x01);

        journal.nonce_change(addr, 0);
        world.set_nonce(addr, 9);
        journal.reset();

        journal.revert(&mut world);
        assert_eq!(world.nonce(addr), 9);
    }

    #[test]
    fn revert_is_idempotent() {
        let mut world = WorldState::in_memory();
        let mut journal = Journal::default();
        let addr = Address::repeat_byte(0x01);

        world.set_nonce(addr, 1);
        journal.nonce_change(addr, 1);
        world.set_nonce(addr, 2);

        journal.revert(&mut world);
        assert_eq!(world.nonce(addr), 1);
        assert_eq!(journal.len(), 0);

        world.set_nonce(addr, 3);
        journal.revert(&mut world);
        assert_eq!(world.nonce(addr), 3);
    }
}
