use std::sync::Arc;

use alloy::primitives::B256;
use sparseth_storage::{KeyValueStore, StoreError};

use crate::schema::state_key;
use crate::ChainStoreError;

/// Persistence for sparse world-state snapshots, keyed by the state root
/// they commit to.
///
/// The snapshot encoding belongs to the state layer; this store treats it
/// as opaque bytes. The only contract is that a root produced by a commit
/// can later be rebound by loading the same root.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<dyn KeyValueStore>,
}

impl StateStore {
    pub fn new(db: Arc<dyn KeyValueStore>) -> Self {
        Self { db }
    }

    pub fn put_snapshot(&self, root: B256, snapshot: &[u8]) -> Result<(), ChainStoreError> {
        self.db.put(&state_key(root), snapshot)?;
        Ok(())
    }

    pub fn snapshot(&self, root: B256) -> Result<Vec<u8>, ChainStoreError> {
        match self.db.get(&state_key(root)) {
            Ok(bytes) => Ok(bytes),
            Err(StoreError::KeyNotFound) => Err(ChainStoreError::StateNotFound),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparseth_storage::MemoryStore;

    #[test]
    fn snapshot_roundtrip() {
        let store = StateStore::new(Arc::new(MemoryStore::new()));
        let root = B256::repeat_byte(0x77);

        store.put_snapshot(root, b"snapshot-bytes").unwrap();
        assert_eq!(store.snapshot(root).unwrap(), b"snapshot-bytes");
    }

    #[test]
    fn missing_snapshot_is_state_not_found() {
        let store = StateStore::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            store.snapshot(B256::ZERO),
            Err(ChainStoreError::StateNotFound)
        ));
    }
}
