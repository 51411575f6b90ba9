//! Blocks.
//!
//! [`StatefulBlock`] is the wire form; [`Block`] wraps it with the cached id
//! and encoding (the id is the Keccak256 of the wire bytes). Contextual
//! verification against the parent and the lookback window lives in the
//! block engine; this module owns the wire format and the structural checks
//! that need no chain context.

use crate::transaction::Transaction;
use crate::{ChainError, Genesis, Result};
use prefixvm_types::Id;
use rlp::{Rlp, RlpStream};
use std::fmt;

/// Version byte leading every encoded block.
pub const BLOCK_FORMAT_VERSION: u8 = 0x00;

/// The wire form of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatefulBlock {
    /// Parent block id; empty for genesis
    pub parent: Id,
    /// Unix seconds; monotone-nondecreasing along any ancestor chain
    pub timestamp: u64,
    /// Required minimum per-transaction proof-of-work difficulty
    pub difficulty: u64,
    /// Required minimum aggregate block cost
    pub cost: u64,
    /// Ordered transactions
    pub txs: Vec<Transaction>,
    /// Chain parameters; populated only in the genesis block
    pub genesis: Option<Genesis>,
}

impl StatefulBlock {
    /// Assemble the genesis block for the given parameters.
    pub fn genesis(timestamp: u64, genesis: Genesis) -> Self {
        Self {
            parent: Id::EMPTY,
            timestamp,
            difficulty: genesis.min_difficulty,
            cost: genesis.min_block_cost,
            txs: Vec::new(),
            genesis: Some(genesis),
        }
    }

    /// Encode to wire bytes: version byte plus RLP body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut stream = RlpStream::new();
        stream.begin_list(6);
        stream.append(&self.parent);
        stream.append(&self.timestamp);
        stream.append(&self.difficulty);
        stream.append(&self.cost);

        stream.begin_list(self.txs.len());
        for tx in &self.txs {
            stream.append(&tx.bytes());
        }

        let genesis_bytes = match &self.genesis {
            Some(genesis) => serde_json::to_vec(genesis)
                .map_err(|e| ChainError::InvalidGenesis(e.to_string()))?,
            None => Vec::new(),
        };
        stream.append(&genesis_bytes.as_slice());

        let body = stream.out();
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(BLOCK_FORMAT_VERSION);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode from wire bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(ChainError::MalformedBlock("empty block".into()));
        }
        if data[0] != BLOCK_FORMAT_VERSION {
            return Err(ChainError::MalformedBlock(format!(
                "unknown block format: 0x{:02x}",
                data[0]
            )));
        }
        let rlp = Rlp::new(&data[1..]);
        if rlp.item_count()? != 6 {
            return Err(ChainError::MalformedBlock("wrong block item count".into()));
        }

        let parent: Id = rlp.val_at(0)?;
        let timestamp: u64 = rlp.val_at(1)?;
        let difficulty: u64 = rlp.val_at(2)?;
        let cost: u64 = rlp.val_at(3)?;

        let tx_list = rlp.at(4)?;
        let mut txs = Vec::with_capacity(tx_list.item_count()?);
        for item in tx_list.iter() {
            let bytes: Vec<u8> = item.as_val()?;
            txs.push(Transaction::decode(&bytes)?);
        }

        let genesis_bytes: Vec<u8> = rlp.val_at(5)?;
        let genesis = if genesis_bytes.is_empty() {
            None
        } else {
            Some(Genesis::from_json(&genesis_bytes)?)
        };

        Ok(Self {
            parent,
            timestamp,
            difficulty,
            cost,
            txs,
            genesis,
        })
    }

    /// Whether this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.parent.is_empty() && self.genesis.is_some()
    }

    /// Sum of the transactions' proof-of-work scores.
    pub fn work_sum(&self) -> u64 {
        self.txs
            .iter()
            .fold(0u64, |acc, tx| acc.saturating_add(tx.difficulty()))
    }

    /// Structural checks that need no parent context.
    pub fn validate_basic(&self, genesis: &Genesis) -> Result<()> {
        if self.is_genesis() {
            if !self.txs.is_empty() {
                return Err(ChainError::MalformedBlock(
                    "genesis block cannot carry transactions".into(),
                ));
            }
            return Ok(());
        }

        if self.parent.is_empty() {
            return Err(ChainError::MalformedBlock("missing parent id".into()));
        }
        if self.txs.is_empty() {
            return Err(ChainError::MalformedBlock("no transactions".into()));
        }
        if self.txs.len() as u64 > genesis.target_transactions {
            return Err(ChainError::MalformedBlock(format!(
                "{} transactions exceed target {}",
                self.txs.len(),
                genesis.target_transactions
            )));
        }
        if self.work_sum() < self.cost {
            return Err(ChainError::MalformedBlock(format!(
                "work {} does not cover block cost {}",
                self.work_sum(),
                self.cost
            )));
        }
        for tx in &self.txs {
            if tx.difficulty() < self.difficulty {
                return Err(ChainError::InsufficientDifficulty {
                    tx: tx.difficulty(),
                    block: self.difficulty,
                });
            }
        }
        Ok(())
    }
}

/// An initialized block: wire form plus cached id and bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    inner: StatefulBlock,
    id: Id,
    bytes: Vec<u8>,
}

impl Block {
    /// Initialize a block from its wire form, computing the caches.
    pub fn new(inner: StatefulBlock) -> Result<Self> {
        let bytes = inner.encode()?;
        let id = Id::keccak256(&bytes);
        Ok(Self { inner, id, bytes })
    }

    /// Decode and initialize a block from wire bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let inner = StatefulBlock::decode(data)?;
        let id = Id::keccak256(data);
        Ok(Self {
            inner,
            id,
            bytes: data.to_vec(),
        })
    }

    /// The block id.
    pub fn id(&self) -> Id {
        self.id
    }

    /// The cached wire bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The wire form.
    pub fn stateful(&self) -> &StatefulBlock {
        &self.inner
    }

    /// The parent block id.
    pub fn parent(&self) -> Id {
        self.inner.parent
    }

    /// The block timestamp in unix seconds.
    pub fn timestamp(&self) -> u64 {
        self.inner.timestamp
    }

    /// The difficulty bound.
    pub fn difficulty(&self) -> u64 {
        self.inner.difficulty
    }

    /// The cost bound.
    pub fn cost(&self) -> u64 {
        self.inner.cost
    }

    /// The block's transactions.
    pub fn txs(&self) -> &[Transaction] {
        &self.inner.txs
    }

    /// Whether this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.inner.is_genesis()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block {{ id: {}, parent: {}, timestamp: {}, txs: {} }}",
            self.id,
            self.inner.parent,
            self.inner.timestamp,
            self.inner.txs.len()
        )
    }
}
