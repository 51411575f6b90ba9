//! Engine lifecycle tests: build, verify, accept, reject, and the
//! difficulty/cost control loops.

use prefixvm_chain::state::{get_prefix_info, get_prefix_value};
use prefixvm_chain::{BaseTx, Genesis, PubKeyBytes, Transaction, TxData, UnsignedTx};
use prefixvm_crypto::PrivateKey;
use prefixvm_storage::{KvStore, MemDb};
use prefixvm_types::Id;
use prefixvm_vm::{Message, Vm, VmError};
use std::sync::Arc;
use tokio::sync::mpsc;

fn new_vm(genesis: &Genesis) -> (Vm, mpsc::Receiver<Message>, Arc<dyn KvStore>) {
    let db: Arc<dyn KvStore> = Arc::new(MemDb::new());
    let (tx, rx) = mpsc::channel(1);
    let vm = Vm::initialize(db.clone(), &serde_json::to_vec(genesis).unwrap(), tx).unwrap();
    (vm, rx, db)
}

fn claim(key: &PrivateKey, prefix: &[u8], anchor: Id, min_difficulty: u64) -> Transaction {
    let mut unsigned = UnsignedTx {
        base: BaseTx {
            sender: PubKeyBytes::from(key.public_key()),
            prefix: prefix.to_vec(),
            graffiti: 0,
            block_id: anchor,
        },
        data: TxData::Claim,
    };
    unsigned.mine(min_difficulty);
    unsigned.sign(key).unwrap()
}

fn set_tx(key: &PrivateKey, prefix: &[u8], value: &[u8], anchor: Id, min_difficulty: u64) -> Transaction {
    let mut unsigned = UnsignedTx {
        base: BaseTx {
            sender: PubKeyBytes::from(key.public_key()),
            prefix: prefix.to_vec(),
            graffiti: 0,
            block_id: anchor,
        },
        data: TxData::Set {
            value: value.to_vec(),
        },
    };
    unsigned.mine(min_difficulty);
    unsigned.sign(key).unwrap()
}

/// Build at `now`, verify and accept; returns the block.
fn advance(vm: &Vm, now: u64) -> prefixvm_chain::Block {
    let block = vm.build_block_at(now).unwrap();
    vm.verify_block(&block).unwrap();
    vm.accept_block(block.id()).unwrap();
    block
}

#[test]
fn test_initialize_writes_genesis() {
    let (vm, _rx, _db) = new_vm(&Genesis::default());

    let tip = vm.last_accepted();
    assert_eq!(vm.preferred(), tip);

    let genesis_block = vm.get_block(tip).unwrap();
    assert!(genesis_block.is_genesis());
    assert_eq!(genesis_block.timestamp(), 0);
    assert_eq!(genesis_block.difficulty(), vm.genesis().min_difficulty);
}

#[test]
fn test_reinitialize_resumes_from_last_accepted() {
    let genesis = Genesis::default();
    let db: Arc<dyn KvStore> = Arc::new(MemDb::new());
    let genesis_bytes = serde_json::to_vec(&genesis).unwrap();

    let (tx, _rx) = mpsc::channel(1);
    let vm = Vm::initialize(db.clone(), &genesis_bytes, tx).unwrap();
    let key = PrivateKey::random();
    vm.submit(claim(&key, b"foo", vm.preferred(), 1));
    let block = advance(&vm, 1);
    drop(vm);

    let (tx, _rx) = mpsc::channel(1);
    let resumed = Vm::initialize(db, &genesis_bytes, tx).unwrap();
    assert_eq!(resumed.last_accepted(), block.id());
    assert_eq!(resumed.preferred(), block.id());
}

#[test]
fn test_submit_signals_pending_txs() {
    let (vm, mut rx, _db) = new_vm(&Genesis::default());
    let key = PrivateKey::random();

    assert!(vm.submit(claim(&key, b"foo", vm.preferred(), 1)));
    assert_eq!(rx.try_recv().unwrap(), Message::PendingTxs);

    // Once the channel fills, further submits drop the signal instead of
    // blocking; the transactions are still pooled.
    assert!(vm.submit(claim(&key, b"bar", vm.preferred(), 1)));
    assert!(vm.submit(claim(&key, b"baz", vm.preferred(), 1)));
    assert_eq!(vm.mempool_len(), 3);
}

#[test]
fn test_build_block_empty_mempool() {
    let (vm, _rx, _db) = new_vm(&Genesis::default());
    assert!(matches!(vm.build_block_at(1), Err(VmError::NoPendingTx)));
}

#[test]
fn test_build_verify_accept_commits_state() {
    let (vm, _rx, db) = new_vm(&Genesis::default());
    let key = PrivateKey::random();
    let genesis_id = vm.preferred();

    vm.submit(claim(&key, b"foo", genesis_id, 1));
    let block = vm.build_block_at(1).unwrap();
    assert_eq!(block.parent(), genesis_id);
    assert_eq!(block.txs().len(), 1);

    vm.verify_block(&block).unwrap();
    // Verified but undecided: nothing durable yet.
    assert!(get_prefix_info(db.as_ref(), b"foo").unwrap().is_none());
    // Verifying a child of the preferred tip moves preference.
    assert_eq!(vm.preferred(), block.id());

    vm.accept_block(block.id()).unwrap();
    assert_eq!(vm.last_accepted(), block.id());

    let info = get_prefix_info(db.as_ref(), b"foo").unwrap().unwrap();
    assert_eq!(info.owner, PubKeyBytes::from(key.public_key()));
    assert_eq!(info.expiry, 1 + vm.genesis().expiry_time);
}

#[test]
fn test_chained_blocks_see_parent_state() {
    let (vm, _rx, db) = new_vm(&Genesis::default());
    let key = PrivateKey::random();
    let genesis_id = vm.preferred();

    vm.submit(claim(&key, b"foo", genesis_id, 1));
    let b1 = vm.build_block_at(1).unwrap();
    vm.verify_block(&b1).unwrap();

    // Build on the unaccepted b1: the set transaction must see the claim
    // through the staged ancestor view.
    vm.submit(set_tx(&key, b"foo", b"v", genesis_id, 1));
    let b2 = vm.build_block_at(2).unwrap();
    assert_eq!(b2.parent(), b1.id());
    vm.verify_block(&b2).unwrap();

    vm.accept_block(b1.id()).unwrap();
    vm.accept_block(b2.id()).unwrap();
    assert_eq!(
        get_prefix_value(db.as_ref(), b"foo").unwrap(),
        Some(b"v".to_vec())
    );
}

#[test]
fn test_duplicate_resubmission_is_skipped_inside_window() {
    let (vm, _rx, _db) = new_vm(&Genesis::default());
    let key = PrivateKey::random();
    let genesis_id = vm.preferred();

    let tx = claim(&key, b"foo", genesis_id, 1);
    vm.submit(tx.clone());
    advance(&vm, 1);

    // Same transaction again while its block is inside the window: the
    // build loop drops it as a duplicate and finds nothing else.
    vm.submit(tx);
    assert!(matches!(vm.build_block_at(2), Err(VmError::NoPendingTx)));
}

#[test]
fn test_build_pushes_back_underworked_tx() {
    let genesis = Genesis {
        min_difficulty: 3,
        ..Genesis::default()
    };
    let (vm, _rx, _db) = new_vm(&genesis);
    let key = PrivateKey::random();
    let genesis_id = vm.preferred();

    // Grind a transaction that clears the floor of 1 but not the block
    // bound of 3.
    let mut unsigned = UnsignedTx {
        base: BaseTx {
            sender: PubKeyBytes::from(key.public_key()),
            prefix: b"weak".to_vec(),
            graffiti: 0,
            block_id: genesis_id,
        },
        data: TxData::Claim,
    };
    while unsigned.difficulty() < 1 || unsigned.difficulty() >= 3 {
        unsigned.base.graffiti = unsigned.base.graffiti.wrapping_add(1);
    }
    let weak = unsigned.sign(&key).unwrap();

    assert!(vm.submit(weak));
    // The builder pushes it back rather than including it, and it stays
    // pooled for a future window with a lower bound.
    assert!(matches!(vm.build_block_at(1), Err(VmError::NoPendingTx)));
    assert_eq!(vm.mempool_len(), 1);
}

#[test]
fn test_verify_rejects_wrong_bounds() {
    let (vm, _rx, _db) = new_vm(&Genesis::default());
    let key = PrivateKey::random();
    let genesis_id = vm.preferred();

    vm.submit(claim(&key, b"foo", genesis_id, 1));
    let block = vm.build_block_at(1).unwrap();

    // Re-encode with a tampered difficulty bound.
    let mut stateful = block.stateful().clone();
    stateful.difficulty += 1;
    let forged = prefixvm_chain::Block::new(stateful).unwrap();
    assert!(vm.verify_block(&forged).is_err());

    // And with a tampered cost.
    let mut stateful = block.stateful().clone();
    stateful.cost += 7;
    let forged = prefixvm_chain::Block::new(stateful).unwrap();
    assert!(vm.verify_block(&forged).is_err());

    // The untampered block still verifies.
    vm.verify_block(&block).unwrap();
}

#[test]
fn test_reject_discards_block_and_state() {
    let (vm, _rx, db) = new_vm(&Genesis::default());
    let key = PrivateKey::random();
    let genesis_id = vm.preferred();

    vm.submit(claim(&key, b"foo", genesis_id, 1));
    let block = vm.build_block_at(1).unwrap();
    vm.verify_block(&block).unwrap();

    vm.reject_block(block.id()).unwrap();
    assert!(matches!(
        vm.get_block(block.id()),
        Err(VmError::UnknownBlock(_))
    ));
    assert!(matches!(
        vm.accept_block(block.id()),
        Err(VmError::NotVerified(_))
    ));
    assert!(get_prefix_info(db.as_ref(), b"foo").unwrap().is_none());
}

#[test]
fn test_set_preference_requires_known_block() {
    let (vm, _rx, _db) = new_vm(&Genesis::default());
    assert!(vm.set_preference(Id::keccak256(b"nowhere")).is_err());

    let tip = vm.preferred();
    vm.set_preference(tip).unwrap();
    assert_eq!(vm.preferred(), tip);
}

#[test]
fn test_accept_sweeps_expired_claims() {
    let genesis = Genesis {
        expiry_time: 10,
        ..Genesis::default()
    };
    let (vm, _rx, db) = new_vm(&genesis);
    let key = PrivateKey::random();
    let genesis_id = vm.preferred();

    vm.submit(claim(&key, b"foo", genesis_id, 1));
    advance(&vm, 1);
    assert!(get_prefix_info(db.as_ref(), b"foo").unwrap().is_some());

    // The next accepted block lies past the expiry; acceptance sweeps the
    // claim out of the durable store.
    vm.submit(claim(&key, b"bar", genesis_id, 1));
    advance(&vm, 30);
    assert!(get_prefix_info(db.as_ref(), b"foo").unwrap().is_none());
    assert!(get_prefix_info(db.as_ref(), b"bar").unwrap().is_some());
}

#[test]
fn test_difficulty_rises_on_overshoot() {
    let genesis = Genesis {
        target_transactions: 1,
        ..Genesis::default()
    };
    let (vm, _rx, _db) = new_vm(&genesis);
    let key = PrivateKey::random();
    let genesis_id = vm.preferred();

    vm.submit(claim(&key, b"a", genesis_id, 1));
    let b1 = advance(&vm, 1);
    assert_eq!(b1.difficulty(), 1);

    // One tx in the window equals the target: unchanged.
    vm.submit(claim(&key, b"b", genesis_id, 1));
    let b2 = advance(&vm, 2);
    assert_eq!(b2.difficulty(), 1);

    // Two txs in the window exceed the target: one step up.
    vm.submit(claim(&key, b"c", genesis_id, 2));
    let b3 = advance(&vm, 3);
    assert_eq!(b3.difficulty(), 2);
}

#[test]
fn test_difficulty_decays_toward_floor() {
    let genesis = Genesis {
        target_transactions: 2,
        ..Genesis::default()
    };
    let (vm, _rx, _db) = new_vm(&genesis);
    let key = PrivateKey::random();
    let genesis_id = vm.preferred();

    // Push the bound above the floor with an overfull window.
    vm.submit(claim(&key, b"a", genesis_id, 1));
    vm.submit(claim(&key, b"b", genesis_id, 1));
    advance(&vm, 1);
    vm.submit(claim(&key, b"c", genesis_id, 1));
    vm.submit(claim(&key, b"d", genesis_id, 1));
    advance(&vm, 2);
    vm.submit(claim(&key, b"e", genesis_id, 2));
    let raised = advance(&vm, 3);
    assert_eq!(raised.difficulty(), 2);

    // A long quiet stretch relaxes the bound back to the floor.
    let late = 3 + genesis.lookback_window * 3;
    vm.submit(claim(&key, b"f", raised.id(), 1));
    let relaxed = vm.build_block_at(late).unwrap();
    assert_eq!(relaxed.difficulty(), genesis.min_difficulty);
}

#[test]
fn test_cost_rises_under_pressure_and_relaxes() {
    let genesis = Genesis::default();
    let (vm, _rx, _db) = new_vm(&genesis);
    let key = PrivateKey::random();
    let genesis_id = vm.preferred();

    vm.submit(claim(&key, b"a", genesis_id, 1));
    let b1 = advance(&vm, 1);
    assert_eq!(b1.cost(), genesis.min_block_cost);

    // Same-second block: cost grows by the missed slack.
    vm.submit(claim(&key, b"b", genesis_id, 2));
    let b2 = advance(&vm, 1);
    assert_eq!(b2.cost(), genesis.min_block_cost + genesis.block_target);

    // Enough slack returns the cost to the floor.
    vm.submit(claim(&key, b"c", genesis_id, 1));
    let b3 = vm.build_block_at(40).unwrap();
    assert_eq!(b3.cost(), genesis.min_block_cost);
}

#[test]
fn test_difficulty_estimate_on_idle_chain() {
    let (vm, _rx, _db) = new_vm(&Genesis::default());

    // Genesis sits at the floor; a long-idle window estimates floor + 1.
    let now = vm.genesis().lookback_window * 10;
    assert_eq!(
        vm.difficulty_estimate_at(now).unwrap(),
        vm.genesis().min_difficulty + 1
    );
}

#[test]
fn test_valid_block_id_tracks_window() {
    let (vm, _rx, _db) = new_vm(&Genesis::default());
    let key = PrivateKey::random();
    let genesis_id = vm.preferred();

    assert!(vm.valid_block_id_at(genesis_id, 1).unwrap());
    assert!(!vm
        .valid_block_id_at(Id::keccak256(b"unknown"), 1)
        .unwrap());

    vm.submit(claim(&key, b"a", genesis_id, 1));
    let b1 = advance(&vm, 1);

    // Inside the window both the tip and genesis are anchorable.
    assert!(vm.valid_block_id_at(b1.id(), 2).unwrap());
    assert!(vm.valid_block_id_at(genesis_id, 2).unwrap());

    // Far in the future only the tip itself remains.
    let late = vm.genesis().lookback_window * 10;
    assert!(vm.valid_block_id_at(b1.id(), late).unwrap());
    assert!(!vm.valid_block_id_at(genesis_id, late).unwrap());
}
