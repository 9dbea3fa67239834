#![allow(dead_code)] // each test binary uses a subset of the harness

use lattice_common::{
    block::{Block, Root},
    config::{self, Amount},
    crypto::{Hash, KeyPair, PublicKey},
    difficulty::work_valid,
    network::Network,
};
use lattice_daemon::core::ledger::{Ledger, ProcessResult};
use lattice_daemon::core::storage::LedgerStore;
use std::sync::Arc;
use tempdir::TempDir;

/// Smallest nonce clearing the dev threshold for `root`.
pub fn work_for(root: &Root) -> u64 {
    (0u64..)
        .find(|nonce| work_valid(Network::Devnet, root, *nonce))
        .expect("no valid nonce found")
}

/// A dev-network ledger over a throwaway store, seeded with genesis.
pub struct TestChain {
    _dir: TempDir,
    pub store: Arc<LedgerStore>,
    pub ledger: Arc<Ledger>,
}

impl TestChain {
    pub fn new() -> Self {
        Self::with_epoch(Hash::zero(), PublicKey::zero())
    }

    pub fn with_epoch(epoch_link: Hash, epoch_signer: PublicKey) -> Self {
        let dir = TempDir::new("lattice").expect("tempdir");
        let store =
            Arc::new(LedgerStore::open(&dir.path().join("data.ldb"), 128).expect("store open"));
        {
            let mut txn = store.tx_begin_write().expect("write txn");
            store
                .initialize(&mut txn, Network::Devnet)
                .expect("initialize");
            txn.commit().expect("commit");
        }
        let ledger = Arc::new(Ledger::new(
            store.clone(),
            Network::Devnet,
            epoch_link,
            epoch_signer,
        ));
        TestChain {
            _dir: dir,
            store,
            ledger,
        }
    }

    pub fn process(&self, block: &Block) -> ProcessResult {
        let mut txn = self.store.tx_begin_write().expect("write txn");
        let result = self.ledger.process(&mut txn, block).expect("process");
        txn.commit().expect("commit");
        result
    }

    pub fn rollback(&self, hash: &Hash) {
        let mut txn = self.store.tx_begin_write().expect("write txn");
        self.ledger.rollback(&mut txn, hash).expect("rollback");
        txn.commit().expect("commit");
    }

    pub fn genesis_key(&self) -> &'static KeyPair {
        config::genesis_key(Network::Devnet)
    }

    pub fn genesis_account(&self) -> PublicKey {
        config::genesis_account(Network::Devnet)
    }

    pub fn genesis_hash(&self) -> Hash {
        config::genesis(Network::Devnet).hash()
    }

    pub fn genesis_amount(&self) -> Amount {
        config::GENESIS_AMOUNT
    }
}
