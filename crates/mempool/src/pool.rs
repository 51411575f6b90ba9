//! The difficulty-ordered pool.

use parking_lot::RwLock;
use prefixvm_chain::Transaction;
use prefixvm_types::Id;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, trace};

/// Default pool capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Ordering key for the pool index.
///
/// Transactions sort by difficulty descending, then by id bytes ascending
/// so iteration order is deterministic across nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderKey {
    difficulty: u64,
    id: Id,
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .difficulty
            .cmp(&self.difficulty)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct PoolInner {
    by_id: HashMap<Id, Transaction>,
    order: BTreeSet<OrderKey>,
}

/// Bounded max-heap of pending transactions keyed by difficulty.
pub struct Mempool {
    inner: RwLock<PoolInner>,
    capacity: usize,
}

impl Mempool {
    /// Create a pool with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(PoolInner {
                by_id: HashMap::new(),
                order: BTreeSet::new(),
            }),
            capacity,
        }
    }

    /// Add a transaction.
    ///
    /// Returns false if it is already pooled, or if the pool is full and the
    /// transaction does not beat the current minimum.
    pub fn push(&self, tx: Transaction) -> bool {
        let mut inner = self.inner.write();
        let id = tx.id();
        if inner.by_id.contains_key(&id) {
            trace!(tx_id = %id, "skipping duplicate transaction");
            return false;
        }

        let key = OrderKey {
            difficulty: tx.difficulty(),
            id,
        };

        if inner.by_id.len() >= self.capacity {
            // `order` iterates best-first, so the minimum sits at the back.
            let min = match inner.order.iter().next_back() {
                Some(min) => *min,
                None => return false,
            };
            if key >= min {
                trace!(tx_id = %id, "pool full, transaction below minimum");
                return false;
            }
            inner.order.remove(&min);
            inner.by_id.remove(&min.id);
            debug!(evicted = %min.id, "evicted minimum-difficulty transaction");
        }

        inner.order.insert(key);
        inner.by_id.insert(id, tx);
        true
    }

    /// Remove and return the highest-difficulty transaction.
    pub fn pop_max(&self) -> Option<Transaction> {
        let mut inner = self.inner.write();
        let key = *inner.order.iter().next()?;
        inner.order.remove(&key);
        inner.by_id.remove(&key.id)
    }

    /// The id and difficulty of the highest-difficulty transaction.
    pub fn peek(&self) -> Option<(Id, u64)> {
        let inner = self.inner.read();
        inner.order.iter().next().map(|k| (k.id, k.difficulty))
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// Returns true if the pool holds no transactions.
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_id.is_empty()
    }

    /// Whether the pool currently holds the given transaction.
    pub fn contains(&self, id: &Id) -> bool {
        self.inner.read().by_id.contains_key(id)
    }

    /// Drop transactions anchored outside the lookback window; they can
    /// never verify again.
    pub fn prune(&self, recent_block_ids: &HashSet<Id>) -> usize {
        let mut inner = self.inner.write();
        let stale: Vec<OrderKey> = inner
            .order
            .iter()
            .filter(|key| {
                inner
                    .by_id
                    .get(&key.id)
                    .map(|tx| !recent_block_ids.contains(&tx.base().block_id))
                    .unwrap_or(true)
            })
            .copied()
            .collect();

        let count = stale.len();
        for key in stale {
            inner.order.remove(&key);
            inner.by_id.remove(&key.id);
        }
        if count > 0 {
            debug!(count, "pruned unverifiable transactions");
        }
        count
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_id.clear();
        inner.order.clear();
    }
}
