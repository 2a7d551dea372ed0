use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::{Batch, KeyValueStore, KvIterator, KvPair, KvWriter, StoreError};

/// In-memory [`KeyValueStore`] backed by an ordered map.
///
/// Used for tests and for the transient per-block state. `compact` is a
/// no-op.
#[derive(Debug, Default)]
pub struct MemoryStore {
    // None once the store has been closed.
    inner: RwLock<Option<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Some(BTreeMap::new())),
        }
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&BTreeMap<Vec<u8>, Vec<u8>>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self.inner.read().expect("store lock poisoned");
        match guard.as_ref() {
            Some(map) => f(map),
            None => Err(StoreError::Closed),
        }
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<Vec<u8>, Vec<u8>>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.inner.write().expect("store lock poisoned");
        match guard.as_mut() {
            Some(map) => f(map),
            None => Err(StoreError::Closed),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        self.read(|map| Ok(map.contains_key(key)))
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.read(|map| map.get(key).cloned().ok_or(StoreError::KeyNotFound))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.write(|map| {
            map.insert(key.to_vec(), value.to_vec());
            Ok(())
        })
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.write(|map| {
            map.remove(key);
            Ok(())
        })
    }

    fn new_batch(&self) -> Box<dyn Batch + '_> {
        Box::new(MemoryBatch {
            store: self,
            ops: Vec::new(),
            size: 0,
        })
    }

    fn new_batch_with_size(&self, capacity: usize) -> Box<dyn Batch + '_> {
        Box::new(MemoryBatch {
            store: self,
            ops: Vec::with_capacity(capacity),
            size: 0,
        })
    }

    fn new_iterator<'a>(&'a self, prefix: &[u8], start: &[u8]) -> Result<KvIterator<'a>, StoreError> {
        let mut first = prefix.to_vec();
        first.extend_from_slice(start);

        // Snapshot the matching range; the iterator is therefore immune to
        // concurrent modifications.
        let prefix = prefix.to_vec();
        let pairs: Vec<KvPair> = self.read(|map| {
            Ok(map
                .range((Bound::Included(first), Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        })?;

        Ok(Box::new(pairs.into_iter().map(Ok)))
    }

    fn delete_range(&self, start: &[u8], end: &[u8]) -> Result<(), StoreError> {
        self.write(|map| {
            let doomed: Vec<Vec<u8>> = map
                .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
                .map(|(k, _)| k.clone())
                .collect();
            for key in doomed {
                map.remove(&key);
            }
            Ok(())
        })
    }

    fn compact(&self, _start: Option<&[u8]>, _end: Option<&[u8]>) -> Result<(), StoreError> {
        // Nothing to compact in memory, but the store must still be open.
        self.read(|_| Ok(()))
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("store lock poisoned");
        *guard = None;
        Ok(())
    }
}

impl KvWriter for MemoryStore {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        KeyValueStore::put(self, key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        KeyValueStore::delete(self, key)
    }
}

enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

struct MemoryBatch<'a> {
    store: &'a MemoryStore,
    ops: Vec<BatchOp>,
    size: usize,
}

impl KvWriter for MemoryBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.size += key.len() + value.len();
        self.ops.push(BatchOp::Put(key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.size += key.len();
        self.ops.push(BatchOp::Delete(key.to_vec()));
        Ok(())
    }
}

impl Batch for MemoryBatch<'_> {
    fn value_size(&self) -> usize {
        self.size
    }

    fn write(&mut self) -> Result<(), StoreError> {
        // A single map lock makes the batch atomic with respect to other
        // batches and writers.
        self.store.write(|map| {
            for op in &self.ops {
                match op {
                    BatchOp::Put(k, v) => {
                        map.insert(k.clone(), v.clone());
                    }
                    BatchOp::Delete(k) => {
                        map.remove(k);
                    }
                }
            }
            Ok(())
        })
    }

    fn reset(&mut self) {
        self.ops.clear();
        self.size = 0;
    }

    fn replay(&self, target: &mut dyn KvWriter) -> Result<(), StoreError> {
        for op in &self.ops {
            match op {
                BatchOp::Put(k, v) => target.put(k, v)?,
                BatchOp::Delete(k) => target.delete(k)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let store = MemoryStore::new();
        store.put(b"alpha", b"1").unwrap();

        assert_eq!(store.get(b"alpha").unwrap(), b"1");
        assert!(store.has(b"alpha").unwrap());
    }

    #[test]
    fn get_missing_key_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.get(b"nope"), Err(StoreError::KeyNotFound)));
        assert!(!store.has(b"nope").unwrap());
    }

    #[test]
    fn delete_removes_key() {
        let store = MemoryStore::new();
        store.put(b"alpha", b"1").unwrap();
        store.delete(b"alpha").unwrap();

        assert!(matches!(store.get(b"alpha"), Err(StoreError::KeyNotFound)));
    }

    #[test]
    fn closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.put(b"alpha", b"1").unwrap();
        store.close().unwrap();

        assert!(matches!(store.get(b"alpha"), Err(StoreError::Closed)));
        assert!(matches!(store.put(b"beta", b"2"), Err(StoreError::Closed)));
        assert!(matches!(store.compact(None, None), Err(StoreError::Closed)));
    }

    #[test]
    fn batch_commits_atomically() {
        let store = MemoryStore::new();
        let mut batch = store.new_batch_with_size(2);
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"2").unwrap();

        // Nothing visible until write.
        assert!(!store.has(b"a").unwrap());

        batch.write().unwrap();
        assert_eq!(store.get(b"a").unwrap(), b"1");
        assert_eq!(store.get(b"b").unwrap(), b"2");
    }

    #[test]
    fn batch_reset_clears_pending_ops() {
        let store = MemoryStore::new();
        let mut batch = store.new_batch();
        batch.put(b"a", b"1").unwrap();
        batch.reset();
        assert_eq!(batch.value_size(), 0);

        batch.write().unwrap();
        assert!(!store.has(b"a").unwrap());
    }

    #[test]
    fn batch_replay_reproduces_contents() {
        let first = MemoryStore::new();
        let mut second = MemoryStore::new();

        let mut batch = first.new_batch();
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"2").unwrap();
        batch.delete(b"a").unwrap();
        batch.write().unwrap();

        // Replaying onto a second store yields identical contents.
        batch.replay(&mut second).unwrap();

        assert!(!second.has(b"a").unwrap());
        assert_eq!(second.get(b"b").unwrap(), b"2");
    }

    #[test]
    fn iterator_respects_prefix_and_start() {
        let store = MemoryStore::new();
        store.put(b"aa:1", b"1").unwrap();
        store.put(b"aa:2", b"2").unwrap();
        store.put(b"aa:3", b"3").unwrap();
        store.put(b"bb:1", b"x").unwrap();

        let keys: Vec<Vec<u8>> = store
            .new_iterator(b"aa:", b"2")
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();

        assert_eq!(keys, vec![b"aa:2".to_vec(), b"aa:3".to_vec()]);
    }

    #[test]
    fn iterator_orders_keys_lexicographically() {
        let store = MemoryStore::new();
        store.put(b"k:b", b"2").unwrap();
        store.put(b"k:a", b"1").unwrap();
        store.put(b"k:c", b"3").unwrap();

        let keys: Vec<Vec<u8>> = store
            .new_iterator(b"k:", b"")
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();

        assert_eq!(keys, vec![b"k:a".to_vec(), b"k:b".to_vec(), b"k:c".to_vec()]);
    }

    #[test]
    fn delete_range_is_half_open() {
        let store = MemoryStore::new();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        store.put(b"c", b"3").unwrap();

        store.delete_range(b"a", b"c").unwrap();

        assert!(!store.has(b"a").unwrap());
        assert!(!store.has(b"b").unwrap());
        assert!(store.has(b"c").unwrap());
    }
}
