//! secp256k1 ECDSA with the legacy 65-byte wire signature.
//!
//! Signatures on the wire are `r[32] || s[32] || v[1]` where `v` is the
//! recovery id **plus 27**. The offset is a legacy convention preserved for
//! wire compatibility: [`sign_digest`] adds it on emission and
//! [`recover_sender`] subtracts it from a copy of the signature (the
//! caller's buffer is never mutated).

use crate::{keccak256, CryptoError, Result};
use k256::{
    ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
    SecretKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Length of a serialized compressed public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 33;

/// Length of a wire signature in bytes (`r || s || v`).
pub const SIGNATURE_LEN: usize = 65;

/// Offset applied to the recovery byte on the wire.
const LEGACY_SIG_ADJ: u8 = 27;

/// ECDSA private key (32 bytes).
#[derive(Clone)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Generate a random private key using a cryptographically secure RNG.
    pub fn random() -> Self {
        let secret_key = SecretKey::random(&mut OsRng);
        Self {
            inner: SigningKey::from(secret_key),
        }
    }

    /// Create a private key from raw bytes.
    ///
    /// Returns an error if the bytes don't represent a valid scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secret_key = SecretKey::from_bytes(bytes.into())
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self {
            inner: SigningKey::from(secret_key),
        })
    }

    /// Create a private key from a hex string (with or without 0x prefix).
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Self::from_bytes(&arr)
    }

    /// Get the raw bytes of the private key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes().into()
    }

    /// Get the hex-encoded private key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Derive the public key from this private key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: *self.inner.verifying_key(),
        }
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key().to_hex())
            .finish()
    }
}

/// secp256k1 public key.
///
/// Serialized in compressed SEC1 form (33 bytes); this serialization is the
/// transaction `sender` field.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Create a public key from compressed bytes (33 bytes).
    pub fn from_compressed(bytes: &[u8; PUBLIC_KEY_LEN]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self {
            inner: verifying_key,
        })
    }

    /// Create a public key from SEC1 encoded bytes (compressed or uncompressed).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self {
            inner: verifying_key,
        })
    }

    /// Create a public key from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        Self::from_sec1_bytes(&bytes)
    }

    /// Get the compressed public key bytes (33 bytes).
    pub fn to_compressed(&self) -> [u8; PUBLIC_KEY_LEN] {
        let point = self.inner.to_encoded_point(true);
        let mut result = [0u8; PUBLIC_KEY_LEN];
        result.copy_from_slice(point.as_bytes());
        result
    }

    /// Get the hex-encoded compressed public key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_compressed())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("compressed", &self.to_hex())
            .finish()
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let bytes = self.to_compressed();
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            serializer.serialize_bytes(&bytes)
        }
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            PublicKey::from_sec1_bytes(&bytes).map_err(serde::de::Error::custom)
        }
    }
}

/// Sign a 32-byte digest, producing a 65-byte wire signature.
///
/// The recovery byte is emitted with the legacy `+27` offset.
pub fn sign_digest(digest: &[u8; 32], key: &PrivateKey) -> Result<[u8; SIGNATURE_LEN]> {
    let (sig, recovery_id) = key
        .inner
        .sign_prehash_recoverable(digest)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    let mut out = [0u8; SIGNATURE_LEN];
    out[0..64].copy_from_slice(&sig.to_bytes());
    out[64] = recovery_id.to_byte() + LEGACY_SIG_ADJ;
    Ok(out)
}

/// Recover the signer's public key from a digest and a wire signature.
///
/// Fails with [`CryptoError::InvalidSignature`] unless the signature is
/// exactly 65 bytes. The legacy offset is subtracted from a copy; `sig` is
/// left untouched.
pub fn recover_sender(digest: &[u8; 32], sig: &[u8]) -> Result<PublicKey> {
    if sig.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LEN,
            sig.len()
        )));
    }

    let signature = K256Signature::from_slice(&sig[0..64])
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    let v = sig[64].wrapping_sub(LEGACY_SIG_ADJ);
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| CryptoError::InvalidSignature(format!("invalid recovery byte {}", sig[64])))?;

    let verifying_key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;

    Ok(PublicKey {
        inner: verifying_key,
    })
}

/// Hash arbitrary bytes into a signable digest.
#[inline]
pub fn digest(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}
