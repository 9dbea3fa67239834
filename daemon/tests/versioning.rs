mod common;

use common::work_for;
use lattice_common::{
    account::Epoch,
    block::{Block, OpenBlock},
    crypto::{Hash, KeyPair},
    network::Network,
    serializer::Serializer,
};
use lattice_daemon::core::storage::versioning::AccountInfoV1;
use lattice_daemon::core::storage::{
    AccountProvider, BlockProvider, BlockSideband, LedgerStore, StorageError, VersionProvider,
};
use tempdir::TempDir;

#[test]
fn account_info_v1_reads_through_current_accessor() {
    let dir = TempDir::new("versioning").unwrap();
    let path = dir.path().join("data.ldb");
    let key = KeyPair::new();
    let account = *key.public_key();
    let open: Block = OpenBlock::new(
        Hash::from(1u64),
        account,
        &key,
        work_for(&Hash::from(account)),
    )
    .into();

    let legacy = AccountInfoV1 {
        head: open.hash(),
        rep_block: open.hash(),
        balance: 3,
        modified: 4,
    };

    {
        let store = LedgerStore::open(&path, 128).unwrap();
        let mut txn = store.tx_begin_write().unwrap();
        store
            .block_put(
                &mut txn,
                &open.hash(),
                &open,
                &BlockSideband {
                    successor: Hash::zero(),
                    account,
                    balance: 3,
                    height: 1,
                    timestamp: 4,
                    epoch: Epoch::Epoch0,
                },
            )
            .unwrap();
        store
            .account_put_v1(&mut txn, &account, &legacy.to_bytes())
            .unwrap();
        store.version_put(&mut txn, 1).unwrap();
        txn.commit().unwrap();
    }

    let store = LedgerStore::open(&path, 128).unwrap();
    let txn = store.tx_begin_read().unwrap();
    let info = store.account_get(&txn, &account).unwrap().unwrap();
    assert_eq!(info.head, legacy.head);
    assert_eq!(info.rep_block, legacy.rep_block);
    assert_eq!(info.balance, legacy.balance);
    assert_eq!(info.modified, legacy.modified);
    // reconstructed fields
    assert_eq!(info.open_block, open.hash());
    assert_eq!(info.block_count, 1);
    assert_eq!(info.epoch, Epoch::Epoch0);
}

#[test]
fn open_block_inferred_through_chain_walk() {
    let dir = TempDir::new("versioning").unwrap();
    let path = dir.path().join("data.ldb");
    let store = LedgerStore::open(&path, 128).unwrap();

    // a fresh store initialized at the current version keeps reading its
    // own rows unchanged
    let mut txn = store.tx_begin_write().unwrap();
    store.initialize(&mut txn, Network::Devnet).unwrap();
    txn.commit().unwrap();

    let txn = store.tx_begin_read().unwrap();
    let genesis = lattice_common::config::genesis_account(Network::Devnet);
    let info = store.account_get(&txn, &genesis).unwrap().unwrap();
    assert_eq!(info.open_block, info.head);
}

#[test]
fn future_store_version_is_rejected() {
    let dir = TempDir::new("versioning").unwrap();
    let path = dir.path().join("data.ldb");
    {
        let store = LedgerStore::open(&path, 128).unwrap();
        let mut txn = store.tx_begin_write().unwrap();
        store.version_put(&mut txn, 99).unwrap();
        txn.commit().unwrap();
    }
    assert!(matches!(
        LedgerStore::open(&path, 128),
        Err(StorageError::UnknownVersion(99))
    ));
}
