//! Registry state operations.
//!
//! All chain records live in one ordered keyspace, discriminated by a
//! leading key byte:
//!
//! - `0x00 || prefix` - the primary [`PrefixInfo`] record
//! - `0x01 || be_u64(expiry) || prefix` - expiry index (empty value)
//! - `0x02 || block_id` - block wire bytes
//! - `0x03` - last-accepted block id
//! - `0x04 || prefix` - the prefix's value payload (set transactions)
//! - `0x05 || be_u64(expiry) || prefix` - prune queue (empty value)
//!
//! The expiry index orders entries by expiry first, so one forward range
//! scan enumerates everything lapsing inside a time window. The index is in
//! exact bijection with the primary keyspace: [`put_prefix_info`] and the
//! sweeper maintain both sides together.

use crate::{ChainError, Result};
use prefixvm_crypto::PUBLIC_KEY_LEN;
use prefixvm_storage::KvStore;
use prefixvm_types::Id;
use serde::{Deserialize, Serialize};
use tracing::debug;

const INFO_KEYSPACE: u8 = 0x00;
const EXPIRY_KEYSPACE: u8 = 0x01;
const BLOCK_KEYSPACE: u8 = 0x02;
const LAST_ACCEPTED_KEY: [u8; 1] = [0x03];
const VALUE_KEYSPACE: u8 = 0x04;
const PRUNE_KEYSPACE: u8 = 0x05;

/// A serialized compressed secp256k1 public key.
///
/// Used for transaction senders and registry owners; compared byte-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PubKeyBytes(pub [u8; PUBLIC_KEY_LEN]);

impl PubKeyBytes {
    /// The all-zero placeholder (never a valid curve point).
    pub const ZERO: Self = Self([0u8; PUBLIC_KEY_LEN]);

    /// Creates key bytes from a slice, checking the length.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != PUBLIC_KEY_LEN {
            return Err(ChainError::InvalidSignature);
        }
        let mut bytes = [0u8; PUBLIC_KEY_LEN];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Returns the key as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex form for display and JSON.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for PubKeyBytes {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<prefixvm_crypto::PublicKey> for PubKeyBytes {
    fn from(pk: prefixvm_crypto::PublicKey) -> Self {
        Self(pk.to_compressed())
    }
}

impl AsRef<[u8]> for PubKeyBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for PubKeyBytes {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for PubKeyBytes {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            hex::decode(&s).map_err(serde::de::Error::custom)?
        } else {
            <Vec<u8>>::deserialize(deserializer)?
        };
        Self::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// The primary registry record for a claimed prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixInfo {
    /// The claimant's serialized public key
    pub owner: PubKeyBytes,
    /// Unix seconds of the creating claim
    pub created: u64,
    /// Unix seconds at which the claim lapses
    pub expiry: u64,
    /// Unit weight assigned at claim time, drives renewal math
    pub units: u64,
}

impl PrefixInfo {
    fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| ChainError::MalformedBlock(format!("prefix info encode: {e}")))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| ChainError::MalformedBlock(format!("prefix info decode: {e}")))
    }
}

fn info_key(prefix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + prefix.len());
    key.push(INFO_KEYSPACE);
    key.extend_from_slice(prefix);
    key
}

fn value_key(prefix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + prefix.len());
    key.push(VALUE_KEYSPACE);
    key.extend_from_slice(prefix);
    key
}

fn timed_key(keyspace: u8, expiry: u64, prefix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(9 + prefix.len());
    key.push(keyspace);
    key.extend_from_slice(&expiry.to_be_bytes());
    key.extend_from_slice(prefix);
    key
}

fn block_key(id: &Id) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(BLOCK_KEYSPACE);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Splits a timed key back into its expiry and prefix components.
fn parse_timed_key(key: &[u8]) -> Result<(u64, Vec<u8>)> {
    if key.len() < 9 {
        return Err(ChainError::MalformedBlock("short index key".into()));
    }
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&key[1..9]);
    Ok((u64::from_be_bytes(ts), key[9..].to_vec()))
}

/// Fetch the registry record for a prefix.
pub fn get_prefix_info(store: &dyn KvStore, prefix: &[u8]) -> Result<Option<PrefixInfo>> {
    match store.get(&info_key(prefix))? {
        Some(bytes) => Ok(Some(PrefixInfo::decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Write a registry record, maintaining the expiry index.
///
/// `prev_expiry` names the index entry superseded by this write; pass 0 for
/// a fresh record so only the insertion occurs.
pub fn put_prefix_info(
    store: &dyn KvStore,
    prefix: &[u8],
    info: &PrefixInfo,
    prev_expiry: u64,
) -> Result<()> {
    if prev_expiry != 0 {
        store.delete(&timed_key(EXPIRY_KEYSPACE, prev_expiry, prefix))?;
    }
    store.put(&timed_key(EXPIRY_KEYSPACE, info.expiry, prefix), &[])?;
    store.put(&info_key(prefix), &info.encode()?)
}

/// Remove a registry record and its index entry.
pub fn delete_prefix_info(store: &dyn KvStore, prefix: &[u8]) -> Result<()> {
    if let Some(info) = get_prefix_info(store, prefix)? {
        store.delete(&timed_key(EXPIRY_KEYSPACE, info.expiry, prefix))?;
        store.delete(&info_key(prefix))?;
    }
    Ok(())
}

/// Fetch the value payload stored under a prefix.
pub fn get_prefix_value(store: &dyn KvStore, prefix: &[u8]) -> Result<Option<Vec<u8>>> {
    Ok(store.get(&value_key(prefix))?)
}

/// Write the value payload stored under a prefix.
pub fn put_prefix_value(store: &dyn KvStore, prefix: &[u8], value: &[u8]) -> Result<()> {
    Ok(store.put(&value_key(prefix), value)?)
}

/// Remove the value payload stored under a prefix.
pub fn delete_prefix_value(store: &dyn KvStore, prefix: &[u8]) -> Result<()> {
    Ok(store.delete(&value_key(prefix))?)
}

/// Sweep claims that lapsed in `(last_time, curr_time]`.
///
/// Every swept claim loses its primary record and index entry immediately.
/// With `remove_data` set, the claim is also queued so [`prune_next`] later
/// removes its value payload. Work is bounded by the entries in the window;
/// each step is a keyed delete, so the pass is idempotent under retry.
pub fn expire_next(
    store: &dyn KvStore,
    last_time: u64,
    curr_time: u64,
    remove_data: bool,
) -> Result<usize> {
    if curr_time < last_time {
        return Ok(0);
    }
    let start = timed_key(EXPIRY_KEYSPACE, last_time.saturating_add(1), &[]);
    let end = timed_key(EXPIRY_KEYSPACE, curr_time.saturating_add(1), &[]);

    let entries = store.scan_range(&start, &end)?;
    let mut expired = 0usize;
    for (key, _) in entries {
        let (expiry, prefix) = parse_timed_key(&key)?;
        store.delete(&info_key(&prefix))?;
        store.delete(&key)?;
        if remove_data {
            store.put(&timed_key(PRUNE_KEYSPACE, expiry, &prefix), &[])?;
        }
        debug!(prefix = %String::from_utf8_lossy(&prefix), expiry, "expired prefix");
        expired += 1;
    }
    Ok(expired)
}

/// Remove up to `limit` queued payloads of expired claims.
///
/// A payload survives if its prefix was re-claimed since being queued (a
/// primary record exists with a later expiry). The queue entry itself is
/// always consumed; the return value counts consumed entries.
pub fn prune_next(store: &dyn KvStore, limit: usize) -> Result<usize> {
    let start = [PRUNE_KEYSPACE];
    let end = [PRUNE_KEYSPACE + 1];

    let entries = store.scan_range_n(&start, &end, limit)?;
    let mut pruned = 0usize;
    for (key, _) in entries {
        let (expiry, prefix) = parse_timed_key(&key)?;
        let reclaimed = match get_prefix_info(store, &prefix)? {
            Some(info) => info.expiry > expiry,
            None => false,
        };
        if !reclaimed {
            store.delete(&value_key(&prefix))?;
        }
        store.delete(&key)?;
        debug!(prefix = %String::from_utf8_lossy(&prefix), reclaimed, "pruned prefix");
        pruned += 1;
    }
    Ok(pruned)
}

/// Store a block's wire bytes under its id.
pub fn put_block_bytes(store: &dyn KvStore, id: &Id, bytes: &[u8]) -> Result<()> {
    Ok(store.put(&block_key(id), bytes)?)
}

/// Fetch a block's wire bytes by id.
pub fn get_block_bytes(store: &dyn KvStore, id: &Id) -> Result<Option<Vec<u8>>> {
    Ok(store.get(&block_key(id))?)
}

/// Read the last-accepted block id, if any.
pub fn get_last_accepted(store: &dyn KvStore) -> Result<Option<Id>> {
    match store.get(&LAST_ACCEPTED_KEY)? {
        Some(bytes) => Ok(Some(
            Id::from_slice(&bytes)
                .map_err(|_| ChainError::MalformedBlock("corrupt last-accepted id".into()))?,
        )),
        None => Ok(None),
    }
}

/// Record the last-accepted block id.
pub fn set_last_accepted(store: &dyn KvStore, id: &Id) -> Result<()> {
    Ok(store.put(&LAST_ACCEPTED_KEY, id.as_bytes())?)
}
