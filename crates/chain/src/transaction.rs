//! Transactions and the execution kernel.
//!
//! This module provides:
//! - [`TxType`] - the wire discriminator for the three variants
//! - [`BaseTx`] - fields shared by every variant (sender, prefix, graffiti
//!   nonce, lookback anchor)
//! - [`UnsignedTx`] - a transaction before signing; where graffiti mining
//!   happens
//! - [`Transaction`] - the signed form with cached id, difficulty and wire
//!   bytes
//! - [`TxContext`] + [`Transaction::verify`] - the uniform pre-check and
//!   variant execution against a staged snapshot
//!
//! The signing digest is the Keccak256 of the unsigned encoding; the
//! transaction id is the Keccak256 of the signed encoding.

use crate::state::{
    delete_prefix_value, get_prefix_info, put_prefix_info, put_prefix_value, PrefixInfo,
    PubKeyBytes,
};
use crate::{ChainError, Genesis, Result};
use prefixvm_crypto::{pow, recover_sender, sign_digest, PrivateKey, SIGNATURE_LEN};
use prefixvm_storage::KvStore;
use prefixvm_types::Id;
use rlp::{Rlp, RlpStream};
use std::collections::HashSet;
use std::fmt;

/// Transaction variant discriminator (leading wire byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TxType {
    /// Assert new ownership of a prefix
    Claim = 0x00,
    /// Extend the expiry of an existing prefix
    Lifeline = 0x01,
    /// Owner-only update of the prefix's value payload
    Set = 0x02,
}

impl TxType {
    /// Returns the discriminator byte.
    pub const fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Creates a TxType from a discriminator byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Self::Claim),
            0x01 => Ok(Self::Lifeline),
            0x02 => Ok(Self::Set),
            _ => Err(ChainError::MalformedBlock(format!(
                "unknown transaction type: 0x{byte:02x}"
            ))),
        }
    }
}

/// Fields shared by every transaction variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseTx {
    /// Serialized public key of the signer
    pub sender: PubKeyBytes,
    /// The namespace key being acted on
    pub prefix: Vec<u8>,
    /// Nonce searched over to satisfy the proof-of-work bound
    pub graffiti: u64,
    /// Recent ancestor anchoring the transaction inside the lookback window
    pub block_id: Id,
}

/// Variant-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxData {
    /// Claim the prefix
    Claim,
    /// Extend the prefix's expiry
    Lifeline,
    /// Replace the prefix's value payload
    Set {
        /// The new payload
        value: Vec<u8>,
    },
}

impl TxData {
    /// The wire discriminator for this payload.
    pub fn tx_type(&self) -> TxType {
        match self {
            TxData::Claim => TxType::Claim,
            TxData::Lifeline => TxType::Lifeline,
            TxData::Set { .. } => TxType::Set,
        }
    }
}

/// A transaction before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTx {
    /// Shared fields
    pub base: BaseTx,
    /// Variant payload
    pub data: TxData,
}

impl UnsignedTx {
    /// Encode the unsigned form: discriminator byte plus RLP body, the
    /// signature slot excluded.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let tx_type = self.data.tx_type();
        let mut stream = RlpStream::new();
        let items = match &self.data {
            TxData::Set { .. } => 5,
            _ => 4,
        };
        stream.begin_list(items);
        stream.append(&self.base.sender.as_bytes());
        stream.append(&self.base.prefix.as_slice());
        stream.append(&self.base.graffiti);
        stream.append(&self.base.block_id);
        if let TxData::Set { value } = &self.data {
            stream.append(&value.as_slice());
        }

        let body = stream.out();
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(tx_type.as_byte());
        out.extend_from_slice(&body);
        out
    }

    /// The 32-byte digest fed to the signer and to recovery.
    pub fn digest(&self) -> [u8; 32] {
        prefixvm_crypto::keccak256(&self.unsigned_bytes())
    }

    /// The proof-of-work score of the current encoding.
    pub fn difficulty(&self) -> u64 {
        pow::difficulty(&self.unsigned_bytes())
    }

    /// Search the graffiti nonce until the score clears `min_difficulty`.
    pub fn mine(&mut self, min_difficulty: u64) {
        while self.difficulty() < min_difficulty {
            self.base.graffiti = self.base.graffiti.wrapping_add(1);
        }
    }

    /// Sign with the given key, producing the wire transaction.
    ///
    /// The sender field is overwritten with the key's serialized public key
    /// so the signature always matches.
    pub fn sign(mut self, key: &PrivateKey) -> Result<Transaction> {
        self.base.sender = PubKeyBytes::from(key.public_key());
        let sig = sign_digest(&self.digest(), key).map_err(|_| ChainError::InvalidSignature)?;
        Ok(Transaction::new(self, sig))
    }
}

/// A signed transaction with cached id, difficulty and wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    unsigned: UnsignedTx,
    signature: [u8; SIGNATURE_LEN],
    // Caches computed at construction
    bytes: Vec<u8>,
    id: Id,
    difficulty: u64,
}

impl Transaction {
    /// Assemble a signed transaction, computing its caches.
    pub fn new(unsigned: UnsignedTx, signature: [u8; SIGNATURE_LEN]) -> Self {
        let difficulty = unsigned.difficulty();
        let bytes = encode_signed(&unsigned, &signature);
        let id = Id::keccak256(&bytes);
        Self {
            unsigned,
            signature,
            bytes,
            id,
            difficulty,
        }
    }

    /// Decode a transaction from wire bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(ChainError::MalformedBlock("empty transaction".into()));
        }
        let tx_type = TxType::from_byte(data[0])?;
        let rlp = Rlp::new(&data[1..]);

        let expected = match tx_type {
            TxType::Set => 6,
            _ => 5,
        };
        if rlp.item_count()? != expected {
            return Err(ChainError::MalformedBlock(
                "wrong transaction item count".into(),
            ));
        }

        let sender_bytes: Vec<u8> = rlp.val_at(0)?;
        let prefix: Vec<u8> = rlp.val_at(1)?;
        let graffiti: u64 = rlp.val_at(2)?;
        let block_id: Id = rlp.val_at(3)?;

        let data_field = match tx_type {
            TxType::Claim => TxData::Claim,
            TxType::Lifeline => TxData::Lifeline,
            TxType::Set => TxData::Set {
                value: rlp.val_at(4)?,
            },
        };

        let sig_bytes: Vec<u8> = rlp.val_at(expected - 1)?;
        if sig_bytes.len() != SIGNATURE_LEN {
            return Err(ChainError::InvalidSignature);
        }
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&sig_bytes);

        let unsigned = UnsignedTx {
            base: BaseTx {
                sender: PubKeyBytes::from_slice(&sender_bytes)?,
                prefix,
                graffiti,
                block_id,
            },
            data: data_field,
        };
        Ok(Self::new(unsigned, signature))
    }

    /// The cached wire bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The transaction id (Keccak256 of the wire bytes).
    pub fn id(&self) -> Id {
        self.id
    }

    /// The cached proof-of-work score.
    pub fn difficulty(&self) -> u64 {
        self.difficulty
    }

    /// The shared fields.
    pub fn base(&self) -> &BaseTx {
        &self.unsigned.base
    }

    /// The variant payload.
    pub fn data(&self) -> &TxData {
        &self.unsigned.data
    }

    /// The declared sender.
    pub fn sender(&self) -> &PubKeyBytes {
        &self.unsigned.base.sender
    }

    /// The wire signature.
    pub fn signature(&self) -> &[u8; SIGNATURE_LEN] {
        &self.signature
    }

    /// Structural prefix checks shared by every variant.
    fn check_prefix(&self, genesis: &Genesis) -> Result<()> {
        let prefix = &self.unsigned.base.prefix;
        if prefix.is_empty() {
            return Err(ChainError::PrefixEmpty);
        }
        if prefix.len() as u64 > genesis.max_prefix_len {
            return Err(ChainError::PrefixTooLong {
                max: genesis.max_prefix_len,
            });
        }
        // A pubkey-shaped prefix is reserved for that key.
        if prefix.len() == prefixvm_crypto::PUBLIC_KEY_LEN
            && prefix.as_slice() != self.unsigned.base.sender.as_bytes()
        {
            return Err(ChainError::PublicKeyMismatch);
        }
        Ok(())
    }

    /// Run the variant semantics against a staged snapshot.
    ///
    /// Performs the structural prefix checks but none of the signature,
    /// proof-of-work or replay checks; [`Transaction::verify`] layers those
    /// on top.
    pub fn execute(&self, store: &dyn KvStore, genesis: &Genesis, block_time: u64) -> Result<()> {
        self.check_prefix(genesis)?;
        let base = &self.unsigned.base;

        match &self.unsigned.data {
            TxData::Claim => {
                let existing = get_prefix_info(store, &base.prefix)?;
                if let Some(info) = &existing {
                    if info.expiry > block_time {
                        return Err(ChainError::PrefixNotExpired);
                    }
                }
                let prev_expiry = existing.map(|i| i.expiry).unwrap_or(0);
                let info = PrefixInfo {
                    owner: base.sender,
                    created: block_time,
                    expiry: block_time + genesis.expiry_time,
                    units: genesis.prefix_units(&base.prefix),
                };
                put_prefix_info(store, &base.prefix, &info, prev_expiry)?;
                // A fresh claim must not inherit the previous owner's payload.
                delete_prefix_value(store, &base.prefix)
            }
            TxData::Lifeline => {
                // A renewal cannot resurrect a swept prefix.
                let mut info = get_prefix_info(store, &base.prefix)?
                    .ok_or(ChainError::PrefixMissing)?;
                let last_expiry = info.expiry;
                let units = genesis.prefix_units(&base.prefix);
                let penalty = (units / genesis.prefix_renewal_discount).max(1);
                // Lifeline spread across all units; no owner check.
                info.expiry += genesis.expiry_time / info.units.max(1) / units / penalty;
                put_prefix_info(store, &base.prefix, &info, last_expiry)
            }
            TxData::Set { value } => {
                let info = get_prefix_info(store, &base.prefix)?
                    .ok_or(ChainError::PrefixMissing)?;
                if info.owner != base.sender {
                    return Err(ChainError::Unauthorized);
                }
                if info.expiry <= block_time {
                    return Err(ChainError::PrefixExpired);
                }
                put_prefix_value(store, &base.prefix, value)
            }
        }
    }

    /// The full kernel: uniform pre-check, then variant execution.
    ///
    /// Check order: prefix shape, proof of work, replay anchors, signature.
    pub fn verify(&self, store: &dyn KvStore, ctx: &TxContext<'_>) -> Result<()> {
        self.check_prefix(ctx.genesis)?;

        if self.difficulty < ctx.block_difficulty {
            return Err(ChainError::InsufficientDifficulty {
                tx: self.difficulty,
                block: ctx.block_difficulty,
            });
        }

        if !ctx.recent_block_ids.contains(&self.unsigned.base.block_id) {
            return Err(ChainError::InvalidBlockId);
        }
        if ctx.recent_tx_ids.contains(&self.id) {
            return Err(ChainError::DuplicateTx);
        }

        let recovered = recover_sender(&self.unsigned.digest(), &self.signature)
            .map_err(|_| ChainError::InvalidSignature)?;
        if recovered.to_compressed() != self.unsigned.base.sender.0 {
            return Err(ChainError::InvalidSignature);
        }

        self.execute(store, ctx.genesis, ctx.block_time)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tx {{ id: {}, type: {:?}, prefix: {}, difficulty: {} }}",
            self.id,
            self.unsigned.data.tx_type(),
            String::from_utf8_lossy(&self.unsigned.base.prefix),
            self.difficulty
        )
    }
}

/// Everything the kernel needs beyond the snapshot itself.
pub struct TxContext<'a> {
    /// Chain parameters
    pub genesis: &'a Genesis,
    /// The enclosing block's timestamp
    pub block_time: u64,
    /// The enclosing block's difficulty bound
    pub block_difficulty: u64,
    /// Block ids inside the lookback window
    pub recent_block_ids: &'a HashSet<Id>,
    /// Transaction ids inside the lookback window
    pub recent_tx_ids: &'a HashSet<Id>,
}

fn encode_signed(unsigned: &UnsignedTx, signature: &[u8; SIGNATURE_LEN]) -> Vec<u8> {
    let tx_type = unsigned.data.tx_type();
    let mut stream = RlpStream::new();
    let items = match &unsigned.data {
        TxData::Set { .. } => 6,
        _ => 5,
    };
    stream.begin_list(items);
    stream.append(&unsigned.base.sender.as_bytes());
    stream.append(&unsigned.base.prefix.as_slice());
    stream.append(&unsigned.base.graffiti);
    stream.append(&unsigned.base.block_id);
    if let TxData::Set { value } = &unsigned.data {
        stream.append(&value.as_slice());
    }
    stream.append(&signature.as_slice());

    let body = stream.out();
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(tx_type.as_byte());
    out.extend_from_slice(&body);
    out
}
