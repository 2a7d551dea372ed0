//! Ordered key-value storage used by the sparse node.
//!
//! Two backends implement the same contract: [`MemoryStore`] for tests and
//! transient per-block state, and [`RocksStore`] for persistent data.

mod mem;
mod rocks;

pub use mem::MemoryStore;
pub use rocks::RocksStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested key is not present in the store.
    #[error("key not found")]
    KeyNotFound,
    /// The store has been closed; no further operations are possible.
    #[error("store closed")]
    Closed,
    /// Any other backend failure.
    #[error("storage backend: {0}")]
    Backend(String),
}

/// A key-value pair yielded by iterators.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Forward iterator over key-value pairs. Resources are released on drop.
pub type KvIterator<'a> = Box<dyn Iterator<Item = Result<KvPair, StoreError>> + Send + 'a>;

/// Write operations shared by stores and batches. Batches buffer them,
/// stores apply them immediately.
pub trait KvWriter {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;
}

/// A write-only batch. Buffered operations are committed atomically with
/// respect to other batches by `write`. Not safe for concurrent use.
pub trait Batch: KvWriter {
    /// Size in bytes of the data queued for writing.
    fn value_size(&self) -> usize;

    /// Commits the buffered operations to the underlying store.
    fn write(&mut self) -> Result<(), StoreError>;

    /// Clears the batch for reuse.
    fn reset(&mut self);

    /// Re-issues the buffered operations, in order, to the given writer.
    fn replay(&self, target: &mut dyn KvWriter) -> Result<(), StoreError>;
}

/// An ordered binary key-value store.
///
/// Implementations are safe for concurrent readers; writers are serialized
/// internally. After `close`, every operation fails with
/// [`StoreError::Closed`].
pub trait KeyValueStore: Send + Sync {
    /// Checks whether the key is present.
    fn has(&self, key: &[u8]) -> Result<bool, StoreError>;

    /// Retrieves the value stored under `key`, failing with
    /// [`StoreError::KeyNotFound`] if absent.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError>;

    /// Inserts or replaces the value stored under `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Removes `key` if present.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Creates a write-only batch that buffers changes until `write`.
    fn new_batch(&self) -> Box<dyn Batch + '_>;

    /// Creates a write-only batch sized for roughly `capacity` operations.
    fn new_batch_with_size(&self, capacity: usize) -> Box<dyn Batch + '_>;

    /// Creates a binary-lexicographic forward iterator over the keys with
    /// the given `prefix`, beginning at the first key >= `prefix || start`.
    /// Note that the prefix is not part of `start`.
    ///
    /// Iterators tolerate concurrent writes but are not required to observe
    /// them.
    fn new_iterator<'a>(&'a self, prefix: &[u8], start: &[u8]) -> Result<KvIterator<'a>, StoreError>;

    /// Removes every key in the half-open range `[start, end)`.
    fn delete_range(&self, start: &[u8], end: &[u8]) -> Result<(), StoreError>;

    /// Advisory compaction of the given key range. A no-op for in-memory
    /// implementations.
    fn compact(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<(), StoreError>;

    /// Closes the store. Subsequent operations fail with
    /// [`StoreError::Closed`].
    fn close(&self) -> Result<(), StoreError>;
}
