//! In-memory ordered key-value store.
//!
//! Backed by a `BTreeMap` under a `parking_lot::RwLock`. Used throughout the
//! test suites and by tooling that needs a throwaway chain state.

use crate::kv::KvStore;
use crate::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// In-memory [`KvStore`] implementation.
#[derive(Default)]
pub struct MemDb {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemDb {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemDb {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn scan_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.read();
        Ok(entries
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn scan_range_n(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.read();
        Ok(entries
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let db = MemDb::new();
        assert_eq!(db.get(b"a").unwrap(), None);

        db.put(b"a", b"1").unwrap();
        assert_eq!(db.get(b"a").unwrap(), Some(b"1".to_vec()));

        db.delete(b"a").unwrap();
        assert_eq!(db.get(b"a").unwrap(), None);
        assert!(db.is_empty());
    }

    #[test]
    fn test_scan_range_ordering() {
        let db = MemDb::new();
        db.put(b"k3", b"c").unwrap();
        db.put(b"k1", b"a").unwrap();
        db.put(b"k2", b"b").unwrap();
        db.put(b"m1", b"x").unwrap();

        let hits = db.scan_range(b"k1", b"k3").unwrap();
        assert_eq!(
            hits,
            vec![
                (b"k1".to_vec(), b"a".to_vec()),
                (b"k2".to_vec(), b"b".to_vec()),
            ]
        );
    }

    #[test]
    fn test_scan_prefix() {
        let db = MemDb::new();
        db.put(b"\x01aa", b"1").unwrap();
        db.put(b"\x01ab", b"2").unwrap();
        db.put(b"\x02aa", b"3").unwrap();

        let hits = db.scan_prefix(b"\x01").unwrap();
        assert_eq!(hits.len(), 2);
    }
}
