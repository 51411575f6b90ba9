//! # PrefixVM Chain
//!
//! The prefix registry state machine:
//!
//! - [`Genesis`] - chain parameters carried by the genesis block
//! - [`Transaction`] - the three signed, proof-of-work-bearing variants
//!   (claim, lifeline, set) and their execution kernel
//! - [`Block`] / [`StatefulBlock`] - the wire block and its initialized form
//! - state operations over the registry: primary records, the expiry index,
//!   and the two-pass expire/prune sweeper
//!
//! Everything here is deterministic: given the same snapshot, block time and
//! recent-id sets, execution produces bit-identical post-state.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod block;
pub mod genesis;
pub mod state;
pub mod transaction;

// Re-export main types at crate root
pub use block::{Block, StatefulBlock, BLOCK_FORMAT_VERSION};
pub use genesis::Genesis;
pub use state::{PrefixInfo, PubKeyBytes};
pub use transaction::{BaseTx, Transaction, TxContext, TxData, TxType, UnsignedTx};

use prefixvm_storage::StorageError;

/// Result type alias for chain operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Errors surfaced by the chain core.
///
/// Transaction-level kinds are local: they cause one transaction to be
/// skipped during building or one block to fail verification. Store errors
/// propagate and abort the current operation.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Signature has the wrong length or the recovered key mismatches the
    /// declared sender
    #[error("invalid signature")]
    InvalidSignature,

    /// A 33-byte prefix that is not the sender's serialized public key
    #[error("public key mismatch")]
    PublicKeyMismatch,

    /// Empty prefix
    #[error("prefix cannot be empty")]
    PrefixEmpty,

    /// Prefix longer than the genesis bound
    #[error("prefix exceeds {max} bytes")]
    PrefixTooLong {
        /// Maximum allowed prefix length
        max: u64,
    },

    /// Claim attempted over a still-valid owner
    #[error("prefix not expired")]
    PrefixNotExpired,

    /// Lifeline on a nonexistent prefix
    #[error("prefix missing")]
    PrefixMissing,

    /// Set on an expired prefix
    #[error("prefix expired")]
    PrefixExpired,

    /// Set by a non-owner
    #[error("sender does not own prefix")]
    Unauthorized,

    /// Transaction anchored outside the lookback window
    #[error("invalid block id")]
    InvalidBlockId,

    /// Transaction id already observed within the lookback window
    #[error("duplicate transaction")]
    DuplicateTx,

    /// Transaction proof of work below the block bound
    #[error("insufficient difficulty: tx {tx} < block {block}")]
    InsufficientDifficulty {
        /// The transaction's difficulty score
        tx: u64,
        /// The block's required minimum
        block: u64,
    },

    /// Block failed structural checks: decode failure, missing parent,
    /// timestamp regression, wrong difficulty or cost, insufficient work
    #[error("malformed block: {0}")]
    MalformedBlock(String),

    /// Invalid genesis parameters
    #[error("invalid genesis: {0}")]
    InvalidGenesis(String),

    /// Storage failure
    #[error(transparent)]
    Store(#[from] StorageError),
}

impl From<rlp::DecoderError> for ChainError {
    fn from(e: rlp::DecoderError) -> Self {
        ChainError::MalformedBlock(format!("rlp: {e}"))
    }
}
