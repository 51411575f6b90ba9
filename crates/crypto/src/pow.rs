//! Proof-of-work difficulty scoring.
//!
//! A transaction's difficulty is the number of leading zero bits in the
//! Keccak256 digest of its unsigned encoding, divided by the encoding's
//! length in 256-byte units. Larger transactions therefore need
//! proportionally more hash work per difficulty point. Submitters search
//! over the graffiti nonce until the score clears the current block bound.

use crate::keccak256;

/// Size of one difficulty unit in bytes.
///
/// A transaction at most this long needs `difficulty` leading zero bits;
/// each additional unit multiplies the requirement.
pub const DIFFICULTY_UNIT_SIZE: usize = 256;

/// Score the proof-of-work difficulty of an encoded payload.
pub fn difficulty(data: &[u8]) -> u64 {
    let units = data.len().div_ceil(DIFFICULTY_UNIT_SIZE).max(1) as u64;
    leading_zero_bits(&keccak256(data)) / units
}

/// Count the leading zero bits of a digest.
fn leading_zero_bits(digest: &[u8; 32]) -> u64 {
    let mut zeros = 0u64;
    for byte in digest {
        if *byte == 0 {
            zeros += 8;
            continue;
        }
        zeros += byte.leading_zeros() as u64;
        break;
    }
    zeros
}
