//! RocksDB storage layer for round history and player stats.

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage operation failed: {0}")]
    Db(#[from] rocksdb::Error),

    #[error("stored value could not be decoded: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Clone)]
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(32 * 1024 * 1024);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get(key)?)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        Ok(self.db.put(key, value)?)
    }

    /// Write several keys atomically; either all land or none do.
    pub fn batch_write<K, V>(&self, items: &[(K, V)]) -> Result<(), StorageError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut batch = WriteBatch::default();
        for (key, value) in items {
            batch.put(key, value);
        }
        Ok(self.db.write(batch)?)
    }

    /// Values under `prefix` in descending key order, newest first for
    /// monotonically keyed entries. Stops after `limit` values.
    pub fn scan_prefix_rev(&self, prefix: &[u8], limit: usize) -> Result<Vec<Vec<u8>>, StorageError> {
        // Seek to the first key past the prefix block, then walk back.
        let mut upper = prefix.to_vec();
        if let Some(last) = upper.last_mut() {
            *last += 1;
        }

        let mut values = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(upper.as_slice(), Direction::Reverse))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(value.to_vec());
            if values.len() >= limit {
                break;
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        storage.put(b"k1", b"v1").unwrap();
        assert_eq!(storage.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(storage.get(b"missing").unwrap(), None);
    }

    #[test]
    fn scan_prefix_rev_returns_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        for id in 0..5u64 {
            let key = format!("round:{:020}", id);
            storage.put(key.as_bytes(), &id.to_le_bytes()).unwrap();
        }
        // A key outside the prefix block must not leak into the scan.
        storage.put(b"stats:x", b"ignored").unwrap();

        let values = storage.scan_prefix_rev(b"round:", 3).unwrap();
        let ids: Vec<u64> = values
            .iter()
            .map(|v| u64::from_le_bytes(v.as_slice().try_into().unwrap()))
            .collect();
        assert_eq!(ids, vec![4, 3, 2]);
    }

    #[test]
    fn batch_write_is_atomic_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        storage
            .batch_write(&[
                (b"a".as_slice(), b"1".as_slice()),
                (b"b".as_slice(), b"2".as_slice()),
            ])
            .unwrap();
        assert_eq!(storage.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(storage.get(b"b").unwrap(), Some(b"2".to_vec()));
    }
}
