//! PrefixVM Storage Layer
//!
//! This crate provides the storage infrastructure for the PrefixVM
//! blockchain:
//!
//! - **KvStore**: the ordered byte-key store contract (get, put, delete,
//!   ascending range scans) every backend implements
//! - **MemDb**: in-memory BTreeMap store used by tests and tooling
//! - **StagedStore**: stackable write-overlay with commit/abort semantics,
//!   backing scratch snapshots during block building and verification
//! - **RocksStore**: the production RocksDB binding

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod kv;
pub mod memdb;
pub mod rocks;
pub mod staged;

// Re-exports for convenience
pub use kv::{KvStore, WriteBatch, WriteOp};
pub use memdb::MemDb;
pub use rocks::{RocksConfig, RocksStore};
pub use staged::{StagedStore, StateDelta};

use thiserror::Error;

/// Storage error types
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend database error
    #[error("database error: {0}")]
    Database(String),

    /// Value encoding/decoding error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A staged snapshot was used after commit/abort
    #[error("staged store already closed")]
    Closed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
