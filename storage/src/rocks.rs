use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rocksdb::{Direction, IteratorMode, Options, WriteBatchIterator, DB};

use crate::{Batch, KeyValueStore, KvIterator, KvWriter, StoreError};

/// Persistent [`KeyValueStore`] backed by RocksDB.
pub struct RocksStore {
    db: DB,
    closed: AtomicBool,
}

impl RocksStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(backend)?;
        Ok(Self {
            db,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

fn backend(err: rocksdb::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl KeyValueStore for RocksStore {
    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        self.ensure_open()?;
        Ok(self.db.get(key).map_err(backend)?.is_some())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.ensure_open()?;
        self.db
            .get(key)
            .map_err(backend)?
            .ok_or(StoreError::KeyNotFound)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.db.put(key, value).map_err(backend)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.db.delete(key).map_err(backend)
    }

    fn new_batch(&self) -> Box<dyn Batch + '_> {
        Box::new(RocksBatch {
            store: self,
            inner: rocksdb::WriteBatch::default(),
        })
    }

    fn new_batch_with_size(&self, _capacity: usize) -> Box<dyn Batch + '_> {
        // RocksDB batches grow on demand; the size hint has no effect.
        self.new_batch()
    }

    fn new_iterator<'a>(&'a self, prefix: &[u8], start: &[u8]) -> Result<KvIterator<'a>, StoreError> {
        self.ensure_open()?;

        let mut first = prefix.to_vec();
        first.extend_from_slice(start);
        let prefix = prefix.to_vec();

        let iter = self
            .db
            .iterator(IteratorMode::From(&first, Direction::Forward))
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(&prefix),
                Err(_) => true,
            })
            .map(|item| {
                item.map(|(k, v)| (k.into_vec(), v.into_vec()))
                    .map_err(backend)
            });

        Ok(Box::new(iter))
    }

    fn delete_range(&self, start: &[u8], end: &[u8]) -> Result<(), StoreError> {
        self.ensure_open()?;

        let mut batch = rocksdb::WriteBatch::default();
        batch.delete_range(start, end);
        self.db.write(batch).map_err(backend)
    }

    fn compact(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.db.compact_range(start, end);
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        // The database handle itself is released on drop; flagging the
        // store closed makes subsequent operations fail first.
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl KvWriter for RocksStore {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        KeyValueStore::put(self, key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        KeyValueStore::delete(self, key)
    }
}

struct RocksBatch<'a> {
    store: &'a RocksStore,
    inner: rocksdb::WriteBatch,
}

impl KvWriter for RocksBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.inner.put(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.inner.delete(key);
        Ok(())
    }
}

impl Batch for RocksBatch<'_> {
    fn value_size(&self) -> usize {
        self.inner.size_in_bytes()
    }

    fn write(&mut self) -> Result<(), StoreError> {
        self.store.ensure_open()?;

        let batch = std::mem::take(&mut self.inner);
        self.store.db.write(batch).map_err(backend)
    }

    fn reset(&mut self) {
        self.inner.clear();
    }

    fn replay(&self, target: &mut dyn KvWriter) -> Result<(), StoreError> {
        let mut replayer = Replayer {
            target,
            result: Ok(()),
        };
        self.inner.iterate(&mut replayer);
        replayer.result
    }
}

// Bridges RocksDB's batch walk onto a KvWriter, keeping the first error.
struct Replayer<'a> {
    target: &'a mut dyn KvWriter,
    result: Result<(), StoreError>,
}

impl WriteBatchIterator for Replayer<'_> {
    fn put(&mut self, key: Box<[u8]>, value: Box<[u8]>) {
        if self.result.is_ok() {
            self.result = self.target.put(&key, &value);
        }
    }

    fn delete(&mut self, key: Box<[u8]>) {
        if self.result.is_ok() {
            self.result = self.target.delete(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn open_temp() -> (tempfile::TempDir, RocksStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn put_get_roundtrip() {
        let (_dir, store) = open_temp();
        store.put(b"alpha", b"1").unwrap();

        assert_eq!(store.get(b"alpha").unwrap(), b"1");
        assert!(matches!(store.get(b"beta"), Err(StoreError::KeyNotFound)));
    }

    #[test]
    fn closed_store_rejects_operations() {
        let (_dir, store) = open_temp();
        store.close().unwrap();

        assert!(matches!(store.get(b"a"), Err(StoreError::Closed)));
        assert!(matches!(store.put(b"a", b"1"), Err(StoreError::Closed)));
    }

    #[test]
    fn batch_write_and_replay() {
        let (_dir, store) = open_temp();
        let mut shadow = MemoryStore::new();

        let mut batch = store.new_batch();
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"2").unwrap();
        batch.delete(b"a").unwrap();

        // Replaying onto a second store yields identical contents.
        batch.replay(&mut shadow).unwrap();
        batch.write().unwrap();

        assert!(!store.has(b"a").unwrap());
        assert_eq!(store.get(b"b").unwrap(), b"2");
        assert!(!shadow.has(b"a").unwrap());
        assert_eq!(shadow.get(b"b").unwrap(), b"2");
    }

    #[test]
    fn iterator_respects_prefix_and_start() {
        let (_dir, store) = open_temp();
        store.put(b"aa:1", b"1").unwrap();
        store.put(b"aa:2", b"2").unwrap();
        store.put(b"ab:1", b"x").unwrap();

        let keys: Vec<Vec<u8>> = store
            .new_iterator(b"aa:", b"2")
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();

        assert_eq!(keys, vec![b"aa:2".to_vec()]);
    }

    #[test]
    fn delete_range_is_half_open() {
        let (_dir, store) = open_temp();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        store.put(b"c", b"3").unwrap();

        store.delete_range(b"a", b"c").unwrap();

        assert!(!store.has(b"a").unwrap());
        assert!(!store.has(b"b").unwrap());
        assert!(store.has(b"c").unwrap());
    }
}
