//! Block and transaction identifiers.
//!
//! An [`Id`] is the Keccak256 digest of an object's wire encoding. Ids
//! compare lexicographically, which the mempool leans on as a
//! deterministic tiebreak, and print as 0x-prefixed hex.

use crate::{Error, Result};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// A 32-byte chain identifier.
///
/// The all-zero [`Id::EMPTY`] stands for "no block": it is the parent of
/// genesis and never the digest of real wire bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id([u8; Self::LEN]);

impl Id {
    /// Width of an id in bytes.
    pub const LEN: usize = 32;

    /// The all-zero id.
    pub const EMPTY: Self = Self([0; Self::LEN]);

    /// Wraps raw bytes as an id.
    pub const fn new(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Digests arbitrary bytes into an id.
    pub fn keccak256(data: &[u8]) -> Self {
        Self(Keccak256::digest(data).into())
    }

    /// Reads an id from a slice that must be exactly [`Id::LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| Error::InvalidId(format!("{} bytes is not an id", bytes.len())))
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True for the all-zero id.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 2 * Self::LEN {
            return Err(Error::InvalidId(format!(
                "want {} hex digits, have {}",
                2 * Self::LEN,
                digits.len()
            )));
        }
        let raw = hex::decode(digits).map_err(|e| Error::InvalidId(e.to_string()))?;
        Self::from_slice(&raw)
    }
}

impl Encodable for Id {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for Id {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        rlp.decoder()
            .decode_value(|bytes| Self::from_slice(bytes).map_err(|_| DecoderError::RlpInvalidLength))
    }
}
