//! Full kernel tests: pre-checks plus execution over staged snapshots.

use prefixvm_chain::state::get_prefix_info;
use prefixvm_chain::{
    BaseTx, ChainError, Genesis, PubKeyBytes, Transaction, TxContext, TxData, UnsignedTx,
};
use prefixvm_crypto::{sign_digest, PrivateKey};
use prefixvm_storage::{KvStore, MemDb, StagedStore};
use prefixvm_types::Id;
use std::collections::HashSet;
use std::sync::Arc;

fn signed_claim(key: &PrivateKey, prefix: &[u8], block_id: Id, min_difficulty: u64) -> Transaction {
    let mut unsigned = UnsignedTx {
        base: BaseTx {
            sender: PubKeyBytes::from(key.public_key()),
            prefix: prefix.to_vec(),
            graffiti: 0,
            block_id,
        },
        data: TxData::Claim,
    };
    unsigned.mine(min_difficulty);
    unsigned.sign(key).unwrap()
}

struct Recents {
    blocks: HashSet<Id>,
    txs: HashSet<Id>,
}

impl Recents {
    fn new(anchor: Id) -> Self {
        let mut blocks = HashSet::new();
        blocks.insert(anchor);
        Self {
            blocks,
            txs: HashSet::new(),
        }
    }

    fn ctx<'a>(&'a self, genesis: &'a Genesis, block_time: u64, difficulty: u64) -> TxContext<'a> {
        TxContext {
            genesis,
            block_time,
            block_difficulty: difficulty,
            recent_block_ids: &self.blocks,
            recent_tx_ids: &self.txs,
        }
    }
}

#[test]
fn test_verify_accepts_valid_claim() {
    let key = PrivateKey::random();
    let genesis = Genesis::default();
    let anchor = Id::keccak256(b"anchor");
    let recents = Recents::new(anchor);

    let db = MemDb::new();
    let tx = signed_claim(&key, b"foo", anchor, 1);
    tx.verify(&db, &recents.ctx(&genesis, 10, 1)).unwrap();

    let info = get_prefix_info(&db, b"foo").unwrap().unwrap();
    assert_eq!(info.owner, PubKeyBytes::from(key.public_key()));
    assert_eq!(info.expiry, 10 + genesis.expiry_time);
}

#[test]
fn test_verify_rejects_unanchored_tx() {
    let key = PrivateKey::random();
    let genesis = Genesis::default();
    let recents = Recents::new(Id::keccak256(b"known"));

    let db = MemDb::new();
    let tx = signed_claim(&key, b"foo", Id::keccak256(b"unknown"), 1);
    let result = tx.verify(&db, &recents.ctx(&genesis, 10, 1));
    assert!(matches!(result, Err(ChainError::InvalidBlockId)));
}

#[test]
fn test_verify_rejects_duplicate_tx() {
    let key = PrivateKey::random();
    let genesis = Genesis::default();
    let anchor = Id::keccak256(b"anchor");
    let mut recents = Recents::new(anchor);

    let db = MemDb::new();
    let tx = signed_claim(&key, b"foo", anchor, 1);
    recents.txs.insert(tx.id());

    let result = tx.verify(&db, &recents.ctx(&genesis, 10, 1));
    assert!(matches!(result, Err(ChainError::DuplicateTx)));
}

#[test]
fn test_verify_rejects_low_difficulty() {
    let key = PrivateKey::random();
    let genesis = Genesis::default();
    let anchor = Id::keccak256(b"anchor");
    let recents = Recents::new(anchor);

    let db = MemDb::new();
    let tx = signed_claim(&key, b"foo", anchor, 1);
    let bound = tx.difficulty() + 1;

    let result = tx.verify(&db, &recents.ctx(&genesis, 10, bound));
    assert!(matches!(
        result,
        Err(ChainError::InsufficientDifficulty { .. })
    ));
}

#[test]
fn test_verify_rejects_forged_sender() {
    let k1 = PrivateKey::random();
    let k2 = PrivateKey::random();
    let genesis = Genesis::default();
    let anchor = Id::keccak256(b"anchor");
    let recents = Recents::new(anchor);

    // Signed with k1 but declaring k2 as the sender.
    let mut unsigned = UnsignedTx {
        base: BaseTx {
            sender: PubKeyBytes::from(k2.public_key()),
            prefix: b"foo".to_vec(),
            graffiti: 0,
            block_id: anchor,
        },
        data: TxData::Claim,
    };
    unsigned.mine(1);
    let sig = sign_digest(&unsigned.digest(), &k1).unwrap();
    let tx = Transaction::new(unsigned, sig);

    let db = MemDb::new();
    let result = tx.verify(&db, &recents.ctx(&genesis, 10, 1));
    assert!(matches!(result, Err(ChainError::InvalidSignature)));
}

#[test]
fn test_failed_tx_leaves_no_writes() {
    let key = PrivateKey::random();
    let genesis = Genesis::default();
    let anchor = Id::keccak256(b"anchor");
    let recents = Recents::new(anchor);

    let db: Arc<dyn KvStore> = Arc::new(MemDb::new());
    let tx = signed_claim(&key, b"foo", anchor, 1);

    // First execution claims the prefix.
    let outer = Arc::new(StagedStore::new(db.clone()));
    tx.verify(outer.as_ref(), &recents.ctx(&genesis, 10, 1))
        .unwrap();

    // A second claim against the same snapshot fails and its scratch layer
    // is discarded without touching the outer snapshot.
    let scratch = StagedStore::new(outer.clone() as Arc<dyn KvStore>);
    let second = signed_claim(&key, b"foo", anchor, 1);
    let result = second.verify(&scratch, &recents.ctx(&genesis, 11, 1));
    assert!(matches!(result, Err(ChainError::PrefixNotExpired)));
    scratch.abort();

    let info = get_prefix_info(outer.as_ref(), b"foo").unwrap().unwrap();
    assert_eq!(info.expiry, 10 + genesis.expiry_time);
}

#[test]
fn test_execution_is_deterministic() {
    let key = PrivateKey::random();
    let genesis = Genesis::default();
    let anchor = Id::keccak256(b"anchor");
    let recents = Recents::new(anchor);

    let tx = signed_claim(&key, b"foo", anchor, 1);

    let run = || {
        let base: Arc<dyn KvStore> = Arc::new(MemDb::new());
        let staged = StagedStore::new(base);
        tx.verify(&staged, &recents.ctx(&genesis, 10, 1)).unwrap();
        staged
            .into_delta()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<_>>()
    };

    assert_eq!(run(), run());
}
