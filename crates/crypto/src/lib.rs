//! # PrefixVM Crypto
//!
//! Cryptographic primitives for the PrefixVM blockchain:
//!
//! - **Keccak256**: digest helpers used for transaction and block ids
//! - **ECDSA**: secp256k1 signing and public-key recovery with the legacy
//!   65-byte wire signature (recovery byte offset by 27)
//! - **Proof of work**: the leading-zero-bits-per-byte difficulty score
//!   transactions must satisfy for inclusion

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod ecdsa;
pub mod pow;

// Re-export main types at crate root
pub use ecdsa::{
    digest, recover_sender, sign_digest, PrivateKey, PublicKey, PUBLIC_KEY_LEN, SIGNATURE_LEN,
};
pub use pow::{difficulty, DIFFICULTY_UNIT_SIZE};

use sha3::{Digest, Keccak256};

/// Result type alias for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Invalid private key material
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Invalid public key encoding
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid signature (wrong length or malformed components)
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Public-key recovery failed
    #[error("recovery failed: {0}")]
    RecoveryFailed(String),

    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size input
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },
}

/// Compute the Keccak256 digest of the given data.
#[inline]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}
