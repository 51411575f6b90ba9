//! Staged write-overlays with commit/abort semantics.
//!
//! A [`StagedStore`] buffers writes over a base store. Reads see the
//! overlay first (read-your-writes), then fall through to the base; sibling
//! overlays over the same base are isolated from one another. `commit`
//! flushes the buffered writes into the base in one batch, `abort` discards
//! them. Overlays stack: the base of a `StagedStore` may itself be a
//! `StagedStore`, which is how per-transaction scratch state nests inside
//! per-block scratch state during block building.

use crate::kv::{KvStore, WriteBatch};
use crate::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// The flattened write set of a staged store.
///
/// `None` marks a deletion. Deltas are what the block engine retains for a
/// verified-but-undecided block and applies to the durable store on accept.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl StateDelta {
    /// Returns true if the delta carries no writes.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Number of buffered writes (puts and deletes).
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Convert the delta into an atomic write batch.
    pub fn into_batch(self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for (key, value) in self.writes {
            match value {
                Some(value) => batch.put(key, value),
                None => batch.delete(key),
            }
        }
        batch
    }

    /// Iterate the buffered writes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Option<Vec<u8>>)> {
        self.writes.iter()
    }
}

/// A stackable write-overlay over a base [`KvStore`].
pub struct StagedStore {
    base: Arc<dyn KvStore>,
    writes: RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl StagedStore {
    /// Create a new overlay over the given base store.
    pub fn new(base: Arc<dyn KvStore>) -> Self {
        Self {
            base,
            writes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Pre-load a delta into the overlay, as if its writes had been staged
    /// here. Used to reconstruct the post-state of a chain of unaccepted
    /// ancestors.
    pub fn apply_delta(&self, delta: &StateDelta) {
        let mut writes = self.writes.write();
        for (key, value) in delta.iter() {
            writes.insert(key.clone(), value.clone());
        }
    }

    /// Flush the buffered writes into the base store as one batch.
    pub fn commit(self) -> Result<()> {
        let delta = StateDelta {
            writes: self.writes.into_inner(),
        };
        self.base.write_batch(delta.into_batch())
    }

    /// Discard the buffered writes.
    pub fn abort(self) {
        // Dropping the overlay is sufficient; nothing reached the base.
    }

    /// Consume the overlay, returning its write set without touching the base.
    pub fn into_delta(self) -> StateDelta {
        StateDelta {
            writes: self.writes.into_inner(),
        }
    }

    /// Number of buffered writes.
    pub fn pending_writes(&self) -> usize {
        self.writes.read().len()
    }
}

impl KvStore for StagedStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(staged) = self.writes.read().get(key) {
            return Ok(staged.clone());
        }
        self.base.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.writes
            .write()
            .insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.writes.write().insert(key.to_vec(), None);
        Ok(())
    }

    fn scan_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        // Merge the base scan with the overlay: overlay entries shadow base
        // entries at the same key, and overlay deletions hide them.
        let base = self.base.scan_range(start, end)?;
        let writes = self.writes.read();

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = base.into_iter().collect();
        for (key, value) in
            writes.range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
        {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}
