use std::collections::{HashMap, HashSet};

use alloy::primitives::{Address, B256};
use tracing::trace;

/// Records account and storage accesses during block processing.
///
/// A read that was not preceded by a write to the same address or slot is
/// an *uninitialized read*: the executed code observed a default value the
/// preparer never loaded. The verifier later checks that every such read
/// was legitimate (the account or slot really was absent before the
/// block).
#[derive(Debug, Default)]
pub(crate) struct Tracer {
    account_writes: HashSet<Address>,
    storage_writes: HashMap<Address, HashSet<B256>>,
    account_reads: HashSet<Address>,
    storage_reads: HashMap<Address, HashSet<B256>>,
}

impl Tracer {
    pub fn on_read_account(&mut self, address: Address) {
        if !self.account_writes.contains(&address) {
            trace!(target: "sparseth::state", %address, "uninitialized account read");
            self.account_reads.insert(address);
        }
    }

    pub fn on_write_account(&mut self, address: Address) {
        self.account_writes.insert(address);
    }

    pub fn on_read_storage(&mut self, address: Address, slot: B256) {
        let written = self
            .storage_writes
            .get(&address)
            .map(|slots| slots.contains(&slot))
            .unwrap_or(false);
        if !written {
            trace!(target: "sparseth::state", %address, %slot, "uninitialized storage read");
            self.storage_reads.entry(address).or_default().insert(slot);
        }
    }

    pub fn on_write_storage(&mut self, address: Address, slot: B256) {
        self.storage_writes.entry(address).or_default().insert(slot);
    }

    /// All addresses written to during tracing.
    pub fn written_accounts(&self) -> Vec<Address> {
        self.account_writes.iter().copied().collect()
    }

    /// All slots written for the given account.
    pub fn written_storage_slots(&self, address: Address) -> Vec<B256> {
        self.storage_writes
            .get(&address)
            .map(|slots| slots.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn uninitialized_account_reads(&self) -> Vec<Address> {
        self.account_reads.iter().copied().collect()
    }

    pub fn uninitialized_storage_reads(&self) -> Vec<(Address, Vec<B256>)> {
        self.storage_reads
            .iter()
            .map(|(address, slots)| (*address, slots.iter().copied().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_before_write_is_uninitialized() {
        let mut tracer = Tracer::default();
        let addr = Address::repeat_byte(0x01);

        tracer.on_read_account(addr);

        assert_eq!(tracer.uninitialized_account_reads(), vec![addr]);
        assert!(tracer.written_accounts().is_empty());
    }

    #[test]
    fn read_after_write_is_initialized() {
        let mut tracer = Tracer::default();
        let addr = Address::repeat_byte(0x01);

        tracer.on_write_account(addr);
        tracer.on_read_account(addr);

        assert!(tracer.uninitialized_account_reads().is_empty());
        assert_eq!(tracer.written_accounts(), vec![addr]);
    }

    #[test]
    fn storage_reads_track_per_slot() {
        let mut tracer = Tracer::default();
        let addr = Address::repeat_byte(0x01);
        let written = B256::with_last_byte(1);
        let unwritten = B256::with_last_byte(2);

        tracer.on_write_storage(addr, written);
        tracer.on_read_storage(addr, written);
        tracer.on_read_storage(addr, unwritten);

        assert_eq!(tracer.written_storage_slots(addr), vec![written]);
        let reads = tracer.uninitialized_storage_reads();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0], (addr, vec![unwritten]));
    }

    #[test]
    fn write_does_not_clear_prior_uninitialized_read() {
        // Read-then-write: the first read still observed the default.
        let mut tracer = Tracer::default();
        let addr = Address::repeat_byte(0x01);

        tracer.on_read_account(addr);
        tracer.on_write_account(addr);

        assert_eq!(tracer.uninitialized_account_reads(), vec![addr]);
    }

    #[test]
    fn empty_tracer_reports_nothing() {
        let tracer = Tracer::default();
        assert!(tracer.written_accounts().is_empty());
        assert!(tracer.uninitialized_account_reads().is_empty());
        assert!(tracer.uninitialized_storage_reads().is_empty());
        assert!(tracer.written_storage_slots(Address::ZERO).is_empty());
    }
}
