//! Randomized ledger exercise: a seeded walk of sends, receives, opens
//! and representative changes, checking conservation, weight and
//! rollback invariants after every step.

mod common;

use common::{work_for, TestChain};
use lattice_common::{
    account::{Epoch, PendingKey},
    block::{Block, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock, StateBlock},
    config::Amount,
    crypto::{Hash, KeyPair, PublicKey},
    difficulty::work_valid,
    network::Network,
};
use lattice_daemon::core::ledger::ProcessResult;
use lattice_daemon::core::storage::{AccountProvider, BlockProvider, PendingProvider};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

type AccountRow = (Hash, Hash, Hash, Amount, u64, Epoch);
type PendingRow = (PublicKey, Amount, Epoch);

#[derive(Debug, PartialEq, Eq)]
struct Snapshot {
    accounts: BTreeMap<PublicKey, AccountRow>,
    pending: BTreeMap<(PublicKey, Hash), PendingRow>,
    weights: BTreeMap<PublicKey, Amount>,
}

fn snapshot(chain: &TestChain) -> Snapshot {
    let txn = chain.store.tx_begin_read().unwrap();
    let accounts = chain
        .store
        .accounts(&txn)
        .unwrap()
        .into_iter()
        .map(|(account, info)| {
            (
                account,
                (
                    info.head,
                    info.rep_block,
                    info.open_block,
                    info.balance,
                    info.block_count,
                    info.epoch,
                ),
            )
        })
        .collect();
    let pending = chain
        .store
        .pending_all(&txn)
        .unwrap()
        .into_iter()
        .map(|(key, info)| {
            (
                (key.destination, key.send_hash),
                (info.source, info.amount, info.epoch),
            )
        })
        .collect();
    let weights = chain.store.rep_weights(&txn).unwrap().into_iter().collect();
    Snapshot {
        accounts,
        pending,
        weights,
    }
}

fn check_invariants(chain: &TestChain) {
    let txn = chain.store.tx_begin_read().unwrap();
    let accounts = chain.store.accounts(&txn).unwrap();
    let pending = chain.store.pending_all(&txn).unwrap();

    // conservation: every raw unit is on a chain head or in flight
    let balances: Amount = accounts.iter().map(|(_, info)| info.balance).sum();
    let in_flight: Amount = pending.iter().map(|(_, info)| info.amount).sum();
    assert_eq!(
        balances + in_flight,
        chain.genesis_amount(),
        "conservation violated"
    );

    // weight consistency: each representative carries exactly the
    // balances delegated to it
    let mut expected: BTreeMap<PublicKey, Amount> = BTreeMap::new();
    for (_, info) in &accounts {
        let rep = chain.ledger.block_representative(&txn, &info.rep_block).unwrap();
        *expected.entry(rep).or_default() += info.balance;
    }
    expected.retain(|_, weight| *weight > 0);
    let stored: BTreeMap<PublicKey, Amount> =
        chain.store.rep_weights(&txn).unwrap().into_iter().collect();
    assert_eq!(stored, expected, "weight inconsistency");

    // no orphans: the block table is exactly the accounts' chains, and
    // every row is keyed by its content hash
    let chain_blocks: u64 = accounts.iter().map(|(_, info)| info.block_count).sum();
    assert_eq!(chain.store.block_count(&txn).unwrap(), chain_blocks);
    for (hash, block, _) in chain.store.blocks(&txn).unwrap() {
        assert_eq!(block.hash(), hash);
    }

    // the frontier index names exactly the chain heads
    let frontiers = chain.store.frontiers(&txn).unwrap();
    assert_eq!(frontiers.len(), accounts.len());
    for (head, account) in &frontiers {
        let info = accounts
            .iter()
            .find(|(a, _)| a == account)
            .map(|(_, info)| info)
            .expect("frontier for unknown account");
        assert_eq!(*head, info.head);
    }

    // every committed block verifies and carries valid work
    let genesis_hash = chain.genesis_hash();
    for (account, info) in &accounts {
        let mut current = info.open_block;
        loop {
            let (block, side) = chain.store.block_get(&txn, &current).unwrap().unwrap();
            assert_eq!(side.account, *account);
            assert!(block.verify_signature(account), "stored block fails I4");
            if current != genesis_hash {
                assert!(
                    work_valid(Network::Devnet, &block.root(), block.work()),
                    "stored block fails I5"
                );
            }
            if current == info.head {
                break;
            }
            current = side.successor;
        }
    }
}

struct Sim {
    chain: TestChain,
    keys: Vec<KeyPair>,
    rng: StdRng,
}

impl Sim {
    fn new(seed: u64) -> Self {
        let chain = TestChain::new();
        let mut keys = vec![chain.genesis_key().clone()];
        keys.extend((0..4).map(|_| KeyPair::new()));
        Sim {
            chain,
            keys,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn current_rep(&self, account: &PublicKey) -> PublicKey {
        let txn = self.chain.store.tx_begin_read().unwrap();
        let info = self
            .chain
            .store
            .account_get(&txn, account)
            .unwrap()
            .unwrap();
        self.chain
            .ledger
            .block_representative(&txn, &info.rep_block)
            .unwrap()
    }

    // Build one random applicable block, or None when the state admits
    // nothing (no funds and nothing pending).
    fn next_block(&mut self) -> Option<Block> {
        for _ in 0..10 {
            let block = match self.rng.gen_range(0..4) {
                0 | 1 => self.random_send(),
                2 => self.random_receive(),
                _ => self.random_change(),
            };
            if block.is_some() {
                return block;
            }
        }
        None
    }

    fn random_send(&mut self) -> Option<Block> {
        let funded: Vec<(PublicKey, Amount, Hash)> = {
            let txn = self.chain.store.tx_begin_read().unwrap();
            self.chain
                .store
                .accounts(&txn)
                .unwrap()
                .into_iter()
                .filter(|(_, info)| info.balance > 0)
                .map(|(account, info)| (account, info.balance, info.head))
                .collect()
        };
        if funded.is_empty() {
            return None;
        }
        let (account, balance, head) = funded[self.rng.gen_range(0..funded.len())];
        let key = self.key_for(&account)?.clone();
        let amount = self.rng.gen_range(1..=balance.min(1_000));
        let destination = self.keys[self.rng.gen_range(0..self.keys.len())].clone();
        let remaining = balance - amount;
        let block: Block = if self.rng.gen_bool(0.5) {
            SendBlock::new(
                head,
                *destination.public_key(),
                remaining,
                &key,
                work_for(&head),
            )
            .into()
        } else {
            let rep = self.current_rep(&account);
            StateBlock::new(
                account,
                head,
                rep,
                remaining,
                Hash::from(*destination.public_key()),
                &key,
                work_for(&head),
            )
            .into()
        };
        Some(block)
    }

    fn random_receive(&mut self) -> Option<Block> {
        let receivable: Vec<(PendingKey, Amount)> = {
            let txn = self.chain.store.tx_begin_read().unwrap();
            self.chain
                .store
                .pending_all(&txn)
                .unwrap()
                .into_iter()
                .map(|(key, info)| (key, info.amount))
                .collect()
        };
        if receivable.is_empty() {
            return None;
        }
        let (pending_key, amount) = receivable[self.rng.gen_range(0..receivable.len())];
        let key = self.key_for(&pending_key.destination)?.clone();
        let existing = {
            let txn = self.chain.store.tx_begin_read().unwrap();
            self.chain
                .store
                .account_get(&txn, &pending_key.destination)
                .unwrap()
        };
        let block: Block = match existing {
            Some(info) => {
                if self.rng.gen_bool(0.5) {
                    ReceiveBlock::new(
                        info.head,
                        pending_key.send_hash,
                        &key,
                        work_for(&info.head),
                    )
                    .into()
                } else {
                    let rep = self.current_rep(&pending_key.destination);
                    StateBlock::new(
                        pending_key.destination,
                        info.head,
                        rep,
                        info.balance + amount,
                        pending_key.send_hash,
                        &key,
                        work_for(&info.head),
                    )
                    .into()
                }
            }
            None => {
                let root = Hash::from(pending_key.destination);
                if self.rng.gen_bool(0.5) {
                    OpenBlock::new(
                        pending_key.send_hash,
                        *key.public_key(),
                        &key,
                        work_for(&root),
                    )
                    .into()
                } else {
                    StateBlock::new(
                        pending_key.destination,
                        Hash::zero(),
                        *key.public_key(),
                        amount,
                        pending_key.send_hash,
                        &key,
                        work_for(&root),
                    )
                    .into()
                }
            }
        };
        Some(block)
    }

    fn random_change(&mut self) -> Option<Block> {
        let accounts: Vec<(PublicKey, Hash)> = {
            let txn = self.chain.store.tx_begin_read().unwrap();
            self.chain
                .store
                .accounts(&txn)
                .unwrap()
                .into_iter()
                .map(|(account, info)| (account, info.head))
                .collect()
        };
        let (account, head) = accounts[self.rng.gen_range(0..accounts.len())];
        let key = self.key_for(&account)?.clone();
        let rep = self.keys[self.rng.gen_range(0..self.keys.len())].clone();
        Some(ChangeBlock::new(head, *rep.public_key(), &key, work_for(&head)).into())
    }

    fn key_for(&self, account: &PublicKey) -> Option<&KeyPair> {
        self.keys.iter().find(|k| k.public_key() == account)
    }
}

fn run_walk(seed: u64, steps: usize) {
    let mut sim = Sim::new(seed);
    for _ in 0..steps {
        let Some(block) = sim.next_block() else { continue };
        let hash = block.hash();

        // rollback is a left inverse of processing
        let before = snapshot(&sim.chain);
        assert_eq!(
            sim.chain.process(&block),
            ProcessResult::Progress,
            "generated block rejected"
        );
        sim.chain.rollback(&hash);
        assert_eq!(snapshot(&sim.chain), before, "rollback not an inverse");

        // re-apply and keep walking
        assert_eq!(sim.chain.process(&block), ProcessResult::Progress);
        check_invariants(&sim.chain);
    }

    // a full unwind leaves only genesis
    let genesis_hash = sim.chain.genesis_hash();
    let first = {
        let txn = sim.chain.store.tx_begin_read().unwrap();
        sim.chain
            .store
            .block_get(&txn, &genesis_hash)
            .unwrap()
            .unwrap()
            .1
            .successor
    };
    if !first.is_zero() {
        sim.chain.rollback(&first);
    }
    let txn = sim.chain.store.tx_begin_read().unwrap();
    assert_eq!(sim.chain.store.block_count(&txn).unwrap(), 1);
    assert_eq!(sim.chain.store.account_count(&txn).unwrap(), 1);
    assert_eq!(sim.chain.store.pending_count(&txn).unwrap(), 0);
    assert_eq!(
        sim.chain
            .ledger
            .weight(&txn, &sim.chain.genesis_account())
            .unwrap(),
        sim.chain.genesis_amount()
    );
}

proptest::proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(8))]

    // conservation holds for arbitrary transfer chains: each amount is
    // sent from genesis and claimed by the receiver
    #[test]
    fn conservation_over_random_transfers(amounts in proptest::collection::vec(1u128..1_000, 1..10)) {
        let chain = TestChain::new();
        let genesis = chain.genesis_key();
        let receiver = KeyPair::new();
        let mut head = chain.genesis_hash();
        let mut balance = chain.genesis_amount();
        for amount in &amounts {
            balance -= amount;
            let send: Block = SendBlock::new(
                head,
                *receiver.public_key(),
                balance,
                genesis,
                work_for(&head),
            )
            .into();
            proptest::prop_assert_eq!(chain.process(&send), ProcessResult::Progress);
            head = send.hash();

            let receive: Block = {
                let txn = chain.store.tx_begin_read().unwrap();
                match chain.store.account_get(&txn, receiver.public_key()).unwrap() {
                    Some(info) => {
                        ReceiveBlock::new(info.head, head, &receiver, work_for(&info.head)).into()
                    }
                    None => {
                        let root = Hash::from(*receiver.public_key());
                        OpenBlock::new(head, *receiver.public_key(), &receiver, work_for(&root))
                            .into()
                    }
                }
            };
            proptest::prop_assert_eq!(chain.process(&receive), ProcessResult::Progress);
            check_invariants(&chain);
        }

        let txn = chain.store.tx_begin_read().unwrap();
        let received: Amount = amounts.iter().sum();
        proptest::prop_assert_eq!(
            chain.ledger.account_balance(&txn, receiver.public_key()).unwrap(),
            received
        );
        proptest::prop_assert_eq!(
            chain.ledger.weight(&txn, receiver.public_key()).unwrap(),
            received
        );
    }
}

#[test]
fn randomized_walk_seed_1() {
    run_walk(1, 50);
}

#[test]
fn randomized_walk_seed_2() {
    run_walk(2, 50);
}

#[test]
fn randomized_walk_seed_3() {
    run_walk(3, 50);
}
