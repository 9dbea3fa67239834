mod common;

use common::{work_for, TestChain};
use lattice_common::{
    account::PendingKey,
    block::{Block, SendBlock},
    crypto::KeyPair,
    vote::Vote,
};
use lattice_daemon::core::elections::{ActiveElections, VoteResult};
use lattice_daemon::core::ledger::ProcessResult;
use lattice_daemon::core::storage::{BlockProvider, PendingProvider};
use lattice_daemon::p2p::NullNetwork;
use std::sync::Arc;

fn elections_for(chain: &TestChain) -> Arc<ActiveElections> {
    Arc::new(ActiveElections::new(
        chain.ledger.clone(),
        Arc::new(NullNetwork),
        *KeyPair::new().public_key(),
        0,
        60,
    ))
}

fn genesis_send(chain: &TestChain, destination: &KeyPair, balance_after: u128) -> Block {
    let head = chain.genesis_hash();
    SendBlock::new(
        head,
        *destination.public_key(),
        balance_after,
        chain.genesis_key(),
        work_for(&head),
    )
    .into()
}

#[test]
fn start_stop() {
    let chain = TestChain::new();
    let active = elections_for(&chain);
    let key1 = KeyPair::new();
    let send1 = genesis_send(&chain, &key1, 0);
    assert_eq!(chain.process(&send1), ProcessResult::Progress);
    assert_eq!(active.roots_len(), 0);

    active.start(Arc::new(send1.clone()));
    assert_eq!(active.roots_len(), 1);
    let election = active.election(&send1.root()).unwrap();
    assert_eq!(election.last_votes_len(), 1);
}

#[test]
fn add_existing() {
    let chain = TestChain::new();
    let active = elections_for(&chain);
    let key1 = KeyPair::new();
    let send1 = genesis_send(&chain, &key1, 0);
    assert_eq!(chain.process(&send1), ProcessResult::Progress);
    active.start(Arc::new(send1.clone()));

    let key2 = KeyPair::new();
    let send2 = genesis_send(&chain, &key2, 0);
    active.start(Arc::new(send2.clone()));
    assert_eq!(active.roots_len(), 1);

    let vote1 = Vote::new(&key2, 0, vec![send2.hash()]);
    assert_eq!(active.vote(&vote1), VoteResult::Processed);
    assert_eq!(active.roots_len(), 1);

    let election = active.election(&send2.root()).unwrap();
    assert_eq!(election.last_votes_len(), 2);
    assert!(election.contains_voter(key2.public_key()));
}

#[test]
fn add_two() {
    let chain = TestChain::new();
    let active = elections_for(&chain);
    let key1 = KeyPair::new();
    let send1 = genesis_send(&chain, &key1, 0);
    assert_eq!(chain.process(&send1), ProcessResult::Progress);
    active.start(Arc::new(send1.clone()));

    let key2 = KeyPair::new();
    let send2: Block = SendBlock::new(
        send1.hash(),
        *key2.public_key(),
        0,
        chain.genesis_key(),
        work_for(&send1.hash()),
    )
    .into();
    assert_eq!(chain.process(&send2), ProcessResult::Progress);
    active.start(Arc::new(send2));
    assert_eq!(active.roots_len(), 2);
}

#[test]
fn sequence_supersession() {
    let chain = TestChain::new();
    let active = elections_for(&chain);
    let key1 = KeyPair::new();
    let key2 = KeyPair::new();
    let voter = KeyPair::new();

    let send1 = genesis_send(&chain, &key1, 0);
    let send2 = genesis_send(&chain, &key2, 0);
    assert_eq!(chain.process(&send1), ProcessResult::Progress);
    active.start(Arc::new(send1.clone()));
    active.start(Arc::new(send2.clone()));

    assert_eq!(
        active.vote(&Vote::new(&voter, 2, vec![send1.hash()])),
        VoteResult::Processed
    );
    // an older sequence from the same voter is a replay
    assert_eq!(
        active.vote(&Vote::new(&voter, 1, vec![send2.hash()])),
        VoteResult::Replay
    );
    assert_eq!(
        active.vote(&Vote::new(&voter, 2, vec![send2.hash()])),
        VoteResult::Replay
    );
    // a newer sequence replaces the entry
    assert_eq!(
        active.vote(&Vote::new(&voter, 3, vec![send2.hash()])),
        VoteResult::Processed
    );
    // voters unknown to any election are indeterminate
    assert_eq!(
        active.vote(&Vote::new(&voter, 4, vec![lattice_common::crypto::Hash::from(99u64)])),
        VoteResult::Indeterminate
    );
}

#[test]
fn quorum_confirms_fork_winner() {
    let chain = TestChain::new();
    let active = elections_for(&chain);
    let key1 = KeyPair::new();
    let key2 = KeyPair::new();

    let send_a = genesis_send(&chain, &key1, chain.genesis_amount() - 10);
    let send_b = genesis_send(&chain, &key2, chain.genesis_amount() - 20);
    assert_eq!(chain.process(&send_a), ProcessResult::Progress);
    assert_eq!(chain.process(&send_b), ProcessResult::Fork);

    active.start(Arc::new(send_a.clone()));
    active.start(Arc::new(send_b.clone()));
    assert_eq!(active.roots_len(), 1);

    // the genesis representative holds the entire online weight, so its
    // vote reaches quorum and flips the chain to send_b
    let vote = Vote::new(chain.genesis_key(), 1, vec![send_b.hash()]);
    assert_eq!(active.vote(&vote), VoteResult::Processed);
    assert_eq!(active.roots_len(), 0);

    let txn = chain.store.tx_begin_read().unwrap();
    assert_eq!(
        chain
            .ledger
            .latest(&txn, &chain.genesis_account())
            .unwrap(),
        Some(send_b.hash())
    );
    assert!(!chain.store.block_exists(&txn, &send_a.hash()).unwrap());
    assert!(chain
        .store
        .pending_get(&txn, &PendingKey::new(*key2.public_key(), send_b.hash()))
        .unwrap()
        .is_some());
    assert!(chain
        .store
        .pending_get(&txn, &PendingKey::new(*key1.public_key(), send_a.hash()))
        .unwrap()
        .is_none());
}

#[test]
fn zero_weight_votes_do_not_confirm() {
    let chain = TestChain::new();
    let active = elections_for(&chain);
    let key1 = KeyPair::new();
    let key2 = KeyPair::new();

    let send_a = genesis_send(&chain, &key1, chain.genesis_amount() - 10);
    let send_b = genesis_send(&chain, &key2, chain.genesis_amount() - 20);
    assert_eq!(chain.process(&send_a), ProcessResult::Progress);
    active.start(Arc::new(send_a.clone()));
    active.start(Arc::new(send_b.clone()));

    let vote = Vote::new(&key2, 1, vec![send_b.hash()]);
    assert_eq!(active.vote(&vote), VoteResult::Processed);

    // no weight behind the vote: the election stays open and the ledger
    // keeps its head
    assert_eq!(active.roots_len(), 1);
    let txn = chain.store.tx_begin_read().unwrap();
    assert_eq!(
        chain
            .ledger
            .latest(&txn, &chain.genesis_account())
            .unwrap(),
        Some(send_a.hash())
    );
}
