use std::sync::Arc;

use alloy::consensus::Header;
use alloy::primitives::B256;
use alloy_rlp::Decodable;
use sparseth_storage::{KeyValueStore, StoreError};

use crate::schema::{header_hash_key, header_number_key};
use crate::ChainStoreError;

/// Persistent access to trusted block headers.
///
/// Two key mappings are maintained: block number -> header hash and header
/// hash -> header. Both are written atomically.
#[derive(Clone)]
pub struct HeaderStore {
    db: Arc<dyn KeyValueStore>,
}

impl HeaderStore {
    pub fn new(db: Arc<dyn KeyValueStore>) -> Self {
        Self { db }
    }

    /// Stores a header under both mappings in a single batch.
    pub fn put(&self, header: &Header) -> Result<(), ChainStoreError> {
        let hash = header.hash_slow();
        let encoded = alloy_rlp::encode(header);

        let mut batch = self.db.new_batch_with_size(2);
        batch.put(&header_hash_key(hash), &encoded)?;
        batch.put(&header_number_key(header.number), hash.as_slice())?;
        batch.write()?;
        Ok(())
    }

    /// Retrieves a header by its hash.
    pub fn get_by_hash(&self, hash: B256) -> Result<Header, ChainStoreError> {
        let encoded = match self.db.get(&header_hash_key(hash)) {
            Ok(encoded) => encoded,
            Err(StoreError::KeyNotFound) => return Err(ChainStoreError::HeaderNotFound),
            Err(err) => return Err(err.into()),
        };

        Ok(Header::decode(&mut encoded.as_slice())?)
    }

    /// Retrieves a header by its block number.
    pub fn get_by_number(&self, num: u64) -> Result<Header, ChainStoreError> {
        let hash = match self.db.get(&header_number_key(num)) {
            Ok(raw) => B256::from_slice(&raw),
            Err(StoreError::KeyNotFound) => return Err(ChainStoreError::HeaderNotFound),
            Err(err) => return Err(err.into()),
        };

        // The number index resolved, so the header record must exist. A
        // miss here means the store is no longer consistent.
        match self.get_by_hash(hash) {
            Ok(header) => Ok(header),
            Err(ChainStoreError::HeaderNotFound) => Err(ChainStoreError::Corrupted(format!(
                "block {num} resolves to hash {hash} with no stored header"
            ))),
            Err(err) => Err(err),
        }
    }
}
