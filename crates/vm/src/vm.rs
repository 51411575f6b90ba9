//! The block engine.

use parking_lot::Mutex;
use prefixvm_chain::state::{
    expire_next, get_block_bytes, get_last_accepted, prune_next, put_block_bytes,
    set_last_accepted,
};
use prefixvm_chain::{Block, ChainError, Genesis, StatefulBlock, Transaction, TxContext};
use prefixvm_mempool::{Mempool, DEFAULT_CAPACITY};
use prefixvm_storage::{KvStore, StagedStore, StateDelta};
use prefixvm_types::Id;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{Result, VmError};

/// Per-block cap on deferred prune work during acceptance.
pub const DEFAULT_PRUNE_LIMIT: usize = 128;

/// Messages the engine pushes to the consensus driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// The mempool holds transactions worth building a block for
    PendingTxs,
}

/// A verified-but-undecided block and the write-delta its execution
/// produced over its parent's post-state.
struct VerifiedBlock {
    block: Block,
    delta: StateDelta,
}

/// Mutable engine state, guarded by one coarse mutex.
struct VmState {
    preferred: Id,
    last_accepted: Id,
    verified: HashMap<Id, VerifiedBlock>,
    mempool: Mempool,
}

/// The block engine and consensus adapter.
pub struct Vm {
    db: Arc<dyn KvStore>,
    genesis: Genesis,
    to_engine: mpsc::Sender<Message>,
    prune_limit: usize,
    state: Mutex<VmState>,
}

impl Vm {
    /// Initialize the engine over a store.
    ///
    /// `genesis_bytes` is the genesis JSON the consensus caller hands over
    /// on every start. A fresh store gets the genesis block written and
    /// accepted; an existing store resumes from its last-accepted block.
    pub fn initialize(
        db: Arc<dyn KvStore>,
        genesis_bytes: &[u8],
        to_engine: mpsc::Sender<Message>,
    ) -> Result<Self> {
        let genesis = Genesis::from_json(genesis_bytes)?;

        let tip = match get_last_accepted(db.as_ref())? {
            Some(id) => {
                info!(block = %id, "initialized from last accepted");
                id
            }
            None => {
                let block = Block::new(StatefulBlock::genesis(0, genesis.clone()))?;
                put_block_bytes(db.as_ref(), &block.id(), block.bytes())?;
                set_last_accepted(db.as_ref(), &block.id())?;
                info!(block = %block.id(), "initialized from genesis");
                block.id()
            }
        };

        Ok(Self {
            db,
            genesis,
            to_engine,
            prune_limit: DEFAULT_PRUNE_LIMIT,
            state: Mutex::new(VmState {
                preferred: tip,
                last_accepted: tip,
                verified: HashMap::new(),
                mempool: Mempool::new(DEFAULT_CAPACITY),
            }),
        })
    }

    /// The chain parameters.
    pub fn genesis(&self) -> &Genesis {
        &self.genesis
    }

    /// The most recent durably committed block.
    pub fn last_accepted(&self) -> Id {
        self.state.lock().last_accepted
    }

    /// The engine's current chain tip choice.
    pub fn preferred(&self) -> Id {
        self.state.lock().preferred
    }

    /// Number of pooled transactions.
    pub fn mempool_len(&self) -> usize {
        self.state.lock().mempool.len()
    }

    /// Fetch a block by id from the verified arena or the store.
    pub fn get_block(&self, id: Id) -> Result<Block> {
        let state = self.state.lock();
        self.get_block_inner(&state, id)
    }

    /// Decode a peer's block from wire bytes.
    pub fn parse_block(&self, bytes: &[u8]) -> Result<Block> {
        let block = Block::from_bytes(bytes)?;
        debug!(block = %block.id(), "parsed block");
        Ok(block)
    }

    /// Point the engine at a new chain tip.
    ///
    /// The target must be a block the engine knows (verified or accepted);
    /// building simply starts from the new tip, block deltas need no
    /// rebuilding.
    pub fn set_preference(&self, id: Id) -> Result<()> {
        let mut state = self.state.lock();
        self.get_block_inner(&state, id)?;
        state.preferred = id;
        info!(block = %id, "set preference");
        Ok(())
    }

    /// Queue a transaction for inclusion and signal the consensus driver.
    ///
    /// Returns false if the pool refused it (duplicate, or full and not
    /// competitive).
    pub fn submit(&self, tx: Transaction) -> bool {
        let pooled = self.state.lock().mempool.push(tx);
        if pooled {
            self.notify_block_ready();
        }
        pooled
    }

    /// Build a block on the preferred tip at the current wall-clock time.
    pub fn build_block(&self) -> Result<Block> {
        self.build_block_at(unix_now())
    }

    /// Build a block on the preferred tip at an explicit timestamp.
    ///
    /// Deterministic given the same state; the wall-clock entry point above
    /// delegates here.
    pub fn build_block_at(&self, now: u64) -> Result<Block> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let parent = self.get_block_inner(state, state.preferred)?;
        if now < parent.timestamp() {
            return Err(ChainError::MalformedBlock("timestamp regression".into()).into());
        }
        let (recent_blocks, recent_txs, cost, difficulty) = self.recents(state, now, &parent)?;

        let view = Arc::new(self.state_view(state, parent.id()));
        let outer = Arc::new(StagedStore::new(view as Arc<dyn KvStore>));

        // Transactions anchored outside the window can never verify again.
        state.mempool.prune(&recent_blocks);

        let mut txs: Vec<Transaction> = Vec::new();
        while (txs.len() as u64) < self.genesis.target_transactions {
            let next = match state.mempool.pop_max() {
                Some(tx) => tx,
                None => break,
            };
            if next.difficulty() < difficulty {
                debug!(
                    block_difficulty = difficulty,
                    tx_difficulty = next.difficulty(),
                    "stopping: next transaction below bound"
                );
                state.mempool.push(next);
                break;
            }
            // Each candidate runs in its own scratch layer so a failure
            // leaves the block's snapshot untouched.
            let scratch = StagedStore::new(outer.clone() as Arc<dyn KvStore>);
            let ctx = TxContext {
                genesis: &self.genesis,
                block_time: now,
                block_difficulty: difficulty,
                recent_block_ids: &recent_blocks,
                recent_tx_ids: &recent_txs,
            };
            match next.verify(&scratch, &ctx) {
                Ok(()) => {
                    scratch.commit()?;
                    txs.push(next);
                }
                Err(e) => {
                    debug!(error = %e, "skipping transaction: failed verification");
                    scratch.abort();
                }
            }
        }

        if txs.is_empty() {
            return Err(VmError::NoPendingTx);
        }

        let block = Block::new(StatefulBlock {
            parent: parent.id(),
            timestamp: now,
            difficulty,
            cost,
            txs,
            genesis: None,
        })?;
        block.stateful().validate_basic(&self.genesis)?;
        info!(block = %block.id(), txs = block.txs().len(), "built block");
        Ok(block)
    }

    /// Verify a block against its parent's post-state.
    ///
    /// On success the block joins the verified arena together with its
    /// write-delta, and becomes preferred if it extends the current tip.
    pub fn verify_block(&self, block: &Block) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let id = block.id();
        if state.verified.contains_key(&id) {
            return Ok(());
        }

        let parent = self
            .get_block_inner(state, block.parent())
            .map_err(|_| ChainError::MalformedBlock("parent missing".into()))?;
        if block.timestamp() < parent.timestamp() {
            return Err(ChainError::MalformedBlock("timestamp regression".into()).into());
        }

        let (recent_blocks, recent_txs, cost, difficulty) =
            self.recents(state, block.timestamp(), &parent)?;
        if block.difficulty() != difficulty {
            return Err(ChainError::MalformedBlock(format!(
                "difficulty {} != expected {difficulty}",
                block.difficulty()
            ))
            .into());
        }
        if block.cost() != cost {
            return Err(ChainError::MalformedBlock(format!(
                "cost {} != expected {cost}",
                block.cost()
            ))
            .into());
        }
        block.stateful().validate_basic(&self.genesis)?;

        let view = Arc::new(self.state_view(state, parent.id()));
        let outer = StagedStore::new(view as Arc<dyn KvStore>);
        let mut seen = HashSet::new();
        for tx in block.txs() {
            // The window sets cannot catch a transaction repeated inside
            // the block itself.
            if !seen.insert(tx.id()) {
                return Err(ChainError::DuplicateTx.into());
            }
            let ctx = TxContext {
                genesis: &self.genesis,
                block_time: block.timestamp(),
                block_difficulty: block.difficulty(),
                recent_block_ids: &recent_blocks,
                recent_tx_ids: &recent_txs,
            };
            tx.verify(&outer, &ctx)?;
        }
        let delta = outer.into_delta();

        if block.parent() == state.preferred {
            state.preferred = id;
        }
        state.verified.insert(
            id,
            VerifiedBlock {
                block: block.clone(),
                delta,
            },
        );
        info!(block = %id, parent = %block.parent(), "verified block");
        Ok(())
    }

    /// Commit a verified block.
    ///
    /// Applies its delta to the durable store, sweeps claims that lapsed
    /// between the parent and this block, prunes a bounded amount of
    /// backlog, then records the block and advances `last_accepted`.
    pub fn accept_block(&self, id: Id) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let parent_ts = {
            let vb = state.verified.get(&id).ok_or(VmError::NotVerified(id))?;
            self.get_block_inner(state, vb.block.parent())?.timestamp()
        };
        let vb = state.verified.remove(&id).ok_or(VmError::NotVerified(id))?;
        let VerifiedBlock { block, delta } = vb;

        self.db.write_batch(delta.into_batch())?;
        expire_next(self.db.as_ref(), parent_ts, block.timestamp(), true)?;
        prune_next(self.db.as_ref(), self.prune_limit)?;
        put_block_bytes(self.db.as_ref(), &block.id(), block.bytes())?;
        set_last_accepted(self.db.as_ref(), &block.id())?;
        state.last_accepted = block.id();
        info!(block = %id, "accepted block");
        Ok(())
    }

    /// Drop a verified block without committing it.
    ///
    /// Its transactions are not returned to the mempool; submitters resend.
    pub fn reject_block(&self, id: Id) -> Result<()> {
        let mut state = self.state.lock();
        if state.verified.remove(&id).is_none() {
            warn!(block = %id, "rejecting block outside the verified set");
        }
        info!(block = %id, "rejected block");
        Ok(())
    }

    /// Whether a block id lies inside the current lookback window.
    ///
    /// Submission front-ends use this to pre-screen transaction anchors.
    pub fn valid_block_id(&self, id: Id) -> Result<bool> {
        self.valid_block_id_at(id, unix_now())
    }

    /// Deterministic form of [`Vm::valid_block_id`].
    pub fn valid_block_id_at(&self, id: Id, now: u64) -> Result<bool> {
        let state = self.state.lock();
        let mut found = false;
        self.read_window(&state, now, state.preferred, |b| {
            if b.id() == id {
                found = true;
                return false;
            }
            true
        })?;
        Ok(found)
    }

    /// Suggested difficulty for new submissions: the mean over the current
    /// window, plus one.
    pub fn difficulty_estimate(&self) -> Result<u64> {
        self.difficulty_estimate_at(unix_now())
    }

    /// Deterministic form of [`Vm::difficulty_estimate`].
    pub fn difficulty_estimate_at(&self, now: u64) -> Result<u64> {
        let state = self.state.lock();
        let mut total = 0u64;
        let mut blocks = 0u64;
        self.read_window(&state, now, state.preferred, |b| {
            total += b.difficulty();
            blocks += 1;
            true
        })?;
        Ok(total / blocks.max(1) + 1)
    }

    fn get_block_inner(&self, state: &VmState, id: Id) -> Result<Block> {
        if let Some(vb) = state.verified.get(&id) {
            return Ok(vb.block.clone());
        }
        match get_block_bytes(self.db.as_ref(), &id)? {
            Some(bytes) => Ok(Block::from_bytes(&bytes)?),
            None => Err(VmError::UnknownBlock(id)),
        }
    }

    /// Walk ancestors from `last_id` while they lie inside the lookback
    /// window; the start block is always visited. Stops early when `visit`
    /// returns false or at genesis. A missing parent is an error, not a
    /// panic: it surfaces through block verification.
    fn read_window<F>(&self, state: &VmState, curr_time: u64, last_id: Id, mut visit: F) -> Result<()>
    where
        F: FnMut(&Block) -> bool,
    {
        let mut curr = self.get_block_inner(state, last_id)?;
        loop {
            let in_window =
                curr_time.saturating_sub(curr.timestamp()) <= self.genesis.lookback_window;
            if !in_window && curr.id() != last_id {
                return Ok(());
            }
            if !visit(&curr) {
                return Ok(());
            }
            if curr.parent().is_empty() {
                return Ok(());
            }
            curr = self.get_block_inner(state, curr.parent())?;
        }
    }

    /// Union of block and transaction ids over the window ending at
    /// `last_block`, plus the next block's cost and difficulty bounds.
    fn recents(
        &self,
        state: &VmState,
        curr_time: u64,
        last_block: &Block,
    ) -> Result<(HashSet<Id>, HashSet<Id>, u64, u64)> {
        let mut block_ids = HashSet::new();
        let mut tx_ids = HashSet::new();
        self.read_window(state, curr_time, last_block.id(), |b| {
            block_ids.insert(b.id());
            for tx in b.txs() {
                tx_ids.insert(tx.id());
            }
            true
        })?;

        let g = &self.genesis;
        let elapsed = curr_time.saturating_sub(last_block.timestamp());

        // Throughput brake: cost grows while blocks arrive faster than the
        // target and relaxes toward the floor otherwise.
        let mut cost = last_block.cost().max(g.min_block_cost);
        if elapsed < g.block_target {
            cost += g.block_target - elapsed;
        } else {
            let excess = elapsed - g.block_target;
            if excess < cost - g.min_block_cost {
                cost -= excess;
            } else {
                cost = g.min_block_cost;
            }
        }

        // One step up on overshoot, geometric relaxation on undershoot.
        let mut difficulty = last_block.difficulty().max(g.min_difficulty);
        let recent_txs = tx_ids.len() as u64;
        if recent_txs > g.target_transactions {
            difficulty += 1;
        } else if recent_txs < g.target_transactions {
            // The current partial window counts as one.
            let elapsed_windows = elapsed / g.lookback_window + 1;
            if elapsed_windows < difficulty - g.min_difficulty {
                difficulty -= elapsed_windows;
            } else {
                difficulty = g.min_difficulty;
            }
        }

        Ok((block_ids, tx_ids, cost, difficulty))
    }

    /// The post-state of `parent_id` as a staged view over the durable
    /// store: the deltas of every unaccepted ancestor, applied oldest
    /// first.
    fn state_view(&self, state: &VmState, parent_id: Id) -> StagedStore {
        let mut chain: Vec<&VerifiedBlock> = Vec::new();
        let mut cur = parent_id;
        while let Some(vb) = state.verified.get(&cur) {
            chain.push(vb);
            cur = vb.block.parent();
        }

        let view = StagedStore::new(self.db.clone());
        for vb in chain.iter().rev() {
            view.apply_delta(&vb.delta);
        }
        view
    }

    fn notify_block_ready(&self) {
        if self.to_engine.try_send(Message::PendingTxs).is_err() {
            debug!("dropping message to consensus engine");
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
