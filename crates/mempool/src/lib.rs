//! # PrefixVM Mempool
//!
//! Transaction pool for the PrefixVM blockchain.
//!
//! Pending transactions are ordered by their cached proof-of-work
//! difficulty, highest first, so block building pops the most-worked
//! transactions until the block fills or the remaining pool drops below the
//! block's difficulty bound. Capacity is bounded: when full, an incoming
//! transaction replaces the pool's minimum only if it beats it.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod pool;

// Re-export main types at crate root
pub use pool::{Mempool, DEFAULT_CAPACITY};
