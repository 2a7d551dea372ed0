use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::Log;
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};
use sparseth_storage::{KeyValueStore, StoreError};

use crate::schema::{chain_head_key, log_key};
use crate::ChainStoreError;

/// RLP-persistable form of a verified event log.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StoredLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub tx_hash: B256,
    pub tx_index: u64,
    pub block_hash: B256,
    pub log_index: u64,
}

impl From<&Log> for StoredLog {
    fn from(log: &Log) -> Self {
        Self {
            address: log.inner.address,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data.clone(),
            block_number: log.block_number.unwrap_or_default(),
            tx_hash: log.transaction_hash.unwrap_or_default(),
            tx_index: log.transaction_index.unwrap_or_default(),
            block_hash: log.block_hash.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
        }
    }
}

/// Persistent storage of verified event logs, plus the rolling hash-chain
/// head per monitored contract.
#[derive(Clone)]
pub struct EventStore {
    db: Arc<dyn KeyValueStore>,
}

impl EventStore {
    pub fn new(db: Arc<dyn KeyValueStore>) -> Self {
        Self { db }
    }

    /// Stores all logs in a single batch.
    pub fn put_all(&self, logs: &[Log]) -> Result<(), ChainStoreError> {
        let mut batch = self.db.new_batch_with_size(logs.len());
        for log in logs {
            let stored = StoredLog::from(log);
            let key = log_key(stored.tx_hash, stored.log_index);
            batch.put(&key, &alloy_rlp::encode(&stored))?;
        }
        batch.write()?;
        Ok(())
    }

    /// Retrieves a log by transaction hash and log index.
    pub fn get(&self, tx_hash: B256, log_index: u64) -> Result<StoredLog, ChainStoreError> {
        let encoded = match self.db.get(&log_key(tx_hash, log_index)) {
            Ok(encoded) => encoded,
            Err(StoreError::KeyNotFound) => return Err(ChainStoreError::LogNotFound),
            Err(err) => return Err(err.into()),
        };
        Ok(StoredLog::decode(&mut encoded.as_slice())?)
    }

    /// Persists the verified hash-chain head for a contract so a restart
    /// can pick up where the last verified block left off.
    pub fn put_chain_head(&self, address: Address, head: B256) -> Result<(), ChainStoreError> {
        self.db.put(&chain_head_key(address), head.as_slice())?;
        Ok(())
    }

    /// Returns the persisted hash-chain head for a contract, if any.
    pub fn chain_head(&self, address: Address) -> Result<Option<B256>, ChainStoreError> {
        match self.db.get(&chain_head_key(address)) {
            Ok(raw) => Ok(Some(B256::from_slice(&raw))),
            Err(StoreError::KeyNotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::LogData;
    use sparseth_storage::MemoryStore;

    fn store() -> EventStore {
        EventStore::new(Arc::new(MemoryStore::new()))
    }

    fn sample_log(tx_hash: B256, log_index: u64) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: Address::repeat_byte(0x11),
                data: LogData::new_unchecked(
                    vec![B256::repeat_byte(0x22), B256::repeat_byte(0x33)],
                    Bytes::from(vec![1, 2, 3]),
                ),
            },
            block_hash: Some(B256::repeat_byte(0x44)),
            block_number: Some(12),
            transaction_hash: Some(tx_hash),
            transaction_index: Some(0),
            log_index: Some(log_index),
            ..Default::default()
        }
    }

    #[test]
    fn put_all_then_get_roundtrips() {
        let store = store();
        let tx_hash = B256::repeat_byte(0xaa);
        let logs = vec![sample_log(tx_hash, 0), sample_log(tx_hash, 1)];

        store.put_all(&logs).unwrap();

        let first = store.get(tx_hash, 0).unwrap();
        assert_eq!(first, StoredLog::from(&logs[0]));
        assert_eq!(first.topics.len(), 2);
        assert_eq!(store.get(tx_hash, 1).unwrap().log_index, 1);
    }

    #[test]
    fn missing_log_is_log_not_found() {
        let store = store();
        assert!(matches!(
            store.get(B256::ZERO, 0),
            Err(ChainStoreError::LogNotFound)
        ));
    }

    #[test]
    fn stored_log_rlp_roundtrip() {
        let stored = StoredLog::from(&sample_log(B256::repeat_byte(0x01), 3));
        let encoded = alloy_rlp::encode(&stored);
        let decoded = StoredLog::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(stored, decoded);
    }

    #[test]
    fn chain_head_roundtrip() {
        let store = store();
        let addr = Address::repeat_byte(0x55);

        assert_eq!(store.chain_head(addr).unwrap(), None);

        store.put_chain_head(addr, B256::repeat_byte(0x66)).unwrap();
        assert_eq!(
            store.chain_head(addr).unwrap(),
            Some(B256::repeat_byte(0x66))
        );
    }
}
