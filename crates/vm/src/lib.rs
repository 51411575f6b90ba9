//! # PrefixVM Engine
//!
//! The block engine and its consensus adapter.
//!
//! [`Vm`] owns the durable store, the chain rules, the mempool and the
//! in-memory arena of verified-but-undecided blocks, and exposes the hooks
//! an external consensus engine drives:
//!
//! - `initialize` / `last_accepted` / `set_preference`
//! - `build_block` / `parse_block` / `get_block`
//! - per-block `verify_block` / `accept_block` / `reject_block`
//! - `submit` for the RPC front-end, which signals [`Message::PendingTxs`]
//!   on the engine channel whenever work arrives
//!
//! Verified blocks never hold a reference back to the engine: each is kept
//! in an arena keyed by id together with the write-delta its execution
//! produced, and all context is passed into the lifecycle calls.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod vm;

// Re-export main types at crate root
pub use vm::{Message, Vm, DEFAULT_PRUNE_LIMIT};

use prefixvm_chain::ChainError;
use prefixvm_storage::StorageError;
use prefixvm_types::Id;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, VmError>;

/// Errors surfaced by the block engine.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// The mempool held no transaction eligible for the next block
    #[error("no pending transactions")]
    NoPendingTx,

    /// The requested block is neither cached nor stored
    #[error("unknown block: {0}")]
    UnknownBlock(Id),

    /// A lifecycle call arrived for a block in the wrong state
    #[error("block {0} has not been verified")]
    NotVerified(Id),

    /// Chain-level failure (transaction kernel, codec, genesis)
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Storage failure
    #[error(transparent)]
    Store(#[from] StorageError),
}
