//! The ordered key-value store contract.
//!
//! Every backend (in-memory, RocksDB, staged overlay) exposes the same
//! minimal surface: point reads and writes plus ascending range scans over
//! a single byte-ordered keyspace. The chain layer builds its record types
//! on top via one-byte key-space prefixes.

use crate::Result;
use std::sync::Arc;

/// Core trait for ordered key-value storage backends.
///
/// # Thread safety
///
/// All implementations are `Send + Sync`; mutating calls take `&self` and
/// synchronize internally.
pub trait KvStore: Send + Sync {
    /// Get a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Insert or overwrite a key-value pair.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key.
    ///
    /// Returns `Ok(())` even if the key does not exist.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Scan keys in `start..end` (end exclusive) in ascending byte order.
    ///
    /// Returns the matching key-value pairs. Callers bound the range so the
    /// result set stays small; the expiry sweeps rely on this ordering.
    fn scan_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Scan at most `limit` keys in `start..end` in ascending byte order.
    ///
    /// Backends override this to stop iterating once the limit is reached.
    fn scan_range_n(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut hits = self.scan_range(start, end)?;
        hits.truncate(limit);
        Ok(hits)
    }

    /// Scan all keys beginning with `prefix` in ascending byte order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.scan_range(prefix, &prefix_upper_bound(prefix))
    }

    /// Check if a key exists.
    fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Apply a batch of write operations atomically.
    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        for op in batch.operations {
            match op {
                WriteOp::Put { key, value } => self.put(&key, &value)?,
                WriteOp::Delete { key } => self.delete(&key)?,
            }
        }
        Ok(())
    }
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        (**self).delete(key)
    }

    fn scan_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        (**self).scan_range(start, end)
    }

    fn scan_range_n(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        (**self).scan_range_n(start, end, limit)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        (**self).write_batch(batch)
    }
}

/// The smallest key strictly greater than every key with the given prefix.
///
/// An all-0xff prefix has no upper bound; the sentinel of the prefix plus a
/// zero byte never occurs in practice because key spaces are introduced by a
/// discriminator byte below 0xff.
pub fn prefix_upper_bound(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < 0xff {
            *last += 1;
            return end;
        }
        end.pop();
    }
    // Unbounded: scan to the maximum representable key.
    vec![0xff; prefix.len() + 9]
}

/// A batch of write operations to be applied atomically.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    /// Operations in this batch.
    pub operations: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create a new empty write batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a put operation to the batch.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.operations.push(WriteOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Add a delete operation to the batch.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.operations.push(WriteOp::Delete { key: key.into() });
    }

    /// Returns true if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the number of operations in the batch.
    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

/// A single write operation within a batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert or update a key-value pair.
    Put {
        /// Key to write.
        key: Vec<u8>,
        /// Value to write.
        value: Vec<u8>,
    },
    /// Delete a key.
    Delete {
        /// Key to delete.
        key: Vec<u8>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_batch() {
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());

        batch.put(b"key1".to_vec(), b"value1".to_vec());
        batch.delete(b"key2".to_vec());

        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(prefix_upper_bound(&[0x01]), vec![0x02]);
        assert_eq!(prefix_upper_bound(&[0x01, 0xff]), vec![0x02]);
        assert_eq!(prefix_upper_bound(&[0x00, 0x61]), vec![0x00, 0x62]);
    }
}
