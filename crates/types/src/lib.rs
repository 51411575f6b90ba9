//! # PrefixVM Types
//!
//! Core type definitions for the PrefixVM blockchain.
//!
//! This crate provides [`Id`], the 32-byte identifier under which blocks
//! and transactions are stored, ordered and referenced. An id is the
//! Keccak256 digest of the object's wire encoding.
//!
//! ## Example
//!
//! ```rust
//! use prefixvm_types::Id;
//!
//! let id = Id::keccak256(b"some wire bytes");
//! assert!(!id.is_empty());
//!
//! // Ids round-trip through their 0x-hex display form.
//! let parsed: Id = id.to_string().parse().unwrap();
//! assert_eq!(parsed, id);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod id;

// Re-export main types at crate root
pub use id::Id;

/// Result type alias for PrefixVM types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with PrefixVM types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A malformed id: wrong width or bad hex digits
    #[error("invalid id: {0}")]
    InvalidId(String),
}
